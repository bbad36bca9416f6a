//! Breakpoint dispatch, run-state transitions and save states

mod common;

use common::{fast_config, serial, simulated};
use or_core::{AccessKind, SessionError};
use or_engine::{RunState, ScriptedAccess, STEP_SENTINEL};
use or_session::{MemoryCallbacks, Session, SYSTEM_BUS};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(AccessKind, u32, String)>>,
}

impl Recorder {
    fn take(&self) -> Vec<(AccessKind, u32, String)> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl MemoryCallbacks for Recorder {
    fn on_read(&self, address: u32, region: &str) {
        self.events.lock().push((AccessKind::Read, address, region.to_string()));
    }

    fn on_write(&self, address: u32, region: &str) {
        self.events.lock().push((AccessKind::Write, address, region.to_string()));
    }

    fn on_execute(&self, address: u32, region: &str) {
        self.events.lock().push((AccessKind::Execute, address, region.to_string()));
    }
}

fn hit_log(session: &Session) -> Arc<Mutex<Vec<(u32, AccessKind)>>> {
    let hits = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&hits);
    session
        .events()
        .on_breakpoint_hit(move |address, kind| log.lock().push((address, kind)));
    hits
}

#[test]
fn test_write_breakpoint_dispatch() {
    let _serial = serial();
    let (engine, loader) = simulated(vec![ScriptedAccess::write(0x8000_0100, 0x55)]);
    let session = Session::start(loader, "sim", b"ROM", &fast_config()).unwrap();
    let recorder = Arc::new(Recorder::default());
    session.events().set_memory_callbacks(Some(recorder.clone()));
    let hits = hit_log(&session);

    session.set_breakpoint(AccessKind::Write, 0x8000_0100).unwrap();
    let before = engine.stats();
    session.advance_frame().unwrap();
    let after = engine.stats();

    assert_eq!(
        recorder.take(),
        vec![(AccessKind::Write, 0x8000_0100, SYSTEM_BUS.to_string())]
    );
    assert_eq!(*hits.lock(), vec![(0x8000_0100, AccessKind::Write)]);
    // Exactly one resume: one run-state change and one step.
    assert_eq!(after.steps - before.steps, 1);
    assert_eq!(after.run_state_changes - before.run_state_changes, 1);
    assert_eq!(session.run_state(), RunState::Running);
    assert_eq!(engine.peek(0x8000_0100), 0x55);
    assert_eq!(session.frame_count(), 1);
}

#[test]
fn test_breakpoints_fire_every_frame_until_removed() {
    let _serial = serial();
    let (_engine, loader) = simulated(vec![
        ScriptedAccess::read(0x200),
        ScriptedAccess::execute(0x300),
    ]);
    let session = Session::start(loader, "sim", b"ROM", &fast_config()).unwrap();
    let hits = hit_log(&session);

    session.set_breakpoint(AccessKind::Read, 0x200).unwrap();
    session.set_breakpoint(AccessKind::Execute, 0x300).unwrap();
    session.advance_frame().unwrap();
    session.advance_frame().unwrap();
    assert_eq!(
        *hits.lock(),
        vec![
            (0x200, AccessKind::Read),
            (0x300, AccessKind::Execute),
            (0x200, AccessKind::Read),
            (0x300, AccessKind::Execute),
        ]
    );

    hits.lock().clear();
    session.remove_breakpoint(AccessKind::Read, 0x200).unwrap();
    session.advance_frame().unwrap();
    assert_eq!(*hits.lock(), vec![(0x300, AccessKind::Execute)]);
}

#[test]
fn test_breakpoint_kind_must_match() {
    let _serial = serial();
    let (engine, loader) = simulated(vec![ScriptedAccess::write(0x400, 1)]);
    let session = Session::start(loader, "sim", b"ROM", &fast_config()).unwrap();
    let hits = hit_log(&session);

    session.set_breakpoint(AccessKind::Read, 0x400).unwrap();
    session.advance_frame().unwrap();
    assert!(hits.lock().is_empty());
    assert_eq!(engine.stats().breaks, 0);
}

#[test]
fn test_breakpoint_without_memory_callbacks() {
    let _serial = serial();
    let (_engine, loader) = simulated(vec![ScriptedAccess::write(0x40, 1)]);
    let session = Session::start(loader, "sim", b"ROM", &fast_config()).unwrap();
    let hits = hit_log(&session);
    assert!(!session.events().has_memory_callbacks());

    session.set_breakpoint(AccessKind::Write, 0x40).unwrap();
    session.advance_frame().unwrap();
    assert_eq!(*hits.lock(), vec![(0x40, AccessKind::Write)]);
}

#[test]
fn test_remove_missing_breakpoint() {
    let _serial = serial();
    let (_engine, loader) = simulated(Vec::new());
    let session = Session::start(loader, "sim", b"ROM", &fast_config()).unwrap();
    session.set_breakpoint(AccessKind::Write, 0x1000).unwrap();

    let err = session
        .remove_breakpoint(AccessKind::Read, 0x1000)
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::BreakpointNotFound { kind: AccessKind::Read, address: 0x1000 }
    ));
    session.remove_breakpoint(AccessKind::Write, 0x1000).unwrap();
}

#[test]
fn test_resume_is_running_plus_one_step() {
    let _serial = serial();
    let (engine, loader) = simulated(Vec::new());
    let session = Session::start(loader, "sim", b"ROM", &fast_config()).unwrap();
    session.advance_frame().unwrap();

    session.pause().unwrap();
    assert_eq!(session.run_state(), RunState::Paused);
    let before = engine.stats();
    session.resume().unwrap();
    let after = engine.stats();

    assert_eq!(after.steps - before.steps, 1);
    assert_eq!(after.run_state_changes - before.run_state_changes, 1);
    assert_eq!(engine.run_state(), RunState::Running);
    assert_eq!(session.run_state(), RunState::Running);
}

#[test]
fn test_single_step_is_not_a_breakpoint() {
    let _serial = serial();
    let (engine, loader) = simulated(vec![ScriptedAccess::write(0x60, 3)]);
    let session = Session::start(loader, "sim", b"ROM", &fast_config()).unwrap();
    let recorder = Arc::new(Recorder::default());
    session.events().set_memory_callbacks(Some(recorder.clone()));
    let hits = hit_log(&session);

    session.step().unwrap();
    assert_eq!(session.run_state(), RunState::Stepping);
    session.advance_frame().unwrap();

    assert_eq!(session.run_state(), RunState::Paused);
    assert!(hits.lock().is_empty());
    assert!(recorder.take().is_empty());
    assert_eq!(engine.stats().breaks, 0);

    session.resume().unwrap();
    session.advance_frame().unwrap();
    assert_eq!(session.frame_count(), 2);
}

#[test]
fn test_step_sentinel_report_is_suppressed() {
    let _serial = serial();
    let (engine, loader) = simulated(Vec::new());
    let session = Session::start(loader, "sim", b"ROM", &fast_config()).unwrap();
    let hits = hit_log(&session);

    engine.report_debug_update(STEP_SENTINEL);
    session.advance_frame().unwrap();

    assert!(hits.lock().is_empty());
    assert_eq!(session.frame_count(), 1);
}

#[test]
fn test_save_and_load_state_round_trip() {
    let _serial = serial();
    let (engine, loader) = simulated(vec![ScriptedAccess::write(0x20, 1)]);
    let session = Session::start(loader, "sim", b"ROM", &fast_config()).unwrap();
    session.advance_frame().unwrap();
    session.advance_frame().unwrap();

    let state = session.save_state().unwrap();
    assert!(!state.is_empty());

    engine.set_script(vec![ScriptedAccess::write(0x20, 2)]);
    session.advance_frame().unwrap();
    assert_eq!(engine.peek(0x20), 2);
    assert_eq!(engine.frame(), 3);

    session.load_state(&state).unwrap();
    assert_eq!(engine.peek(0x20), 1);
    assert_eq!(engine.frame(), 2);

    // The restored state saves back to the same bytes.
    assert_eq!(session.save_state().unwrap(), state);
}

#[test]
fn test_load_state_rejected() {
    let _serial = serial();
    let (_engine, loader) = simulated(Vec::new());
    let session = Session::start(loader, "sim", b"ROM", &fast_config()).unwrap();

    let err = session.load_state(b"not a state").unwrap_err();
    assert!(matches!(err, SessionError::EngineRejected(_)));
    assert!(session.is_alive());
}

#[test]
fn test_save_state_rejected() {
    let _serial = serial();
    let (engine, loader) = simulated(Vec::new());
    let session = Session::start(loader, "sim", b"ROM", &fast_config()).unwrap();
    engine.inject(|faults| faults.reject_state = true);

    assert!(matches!(session.save_state(), Err(SessionError::EngineRejected(_))));
}
