//! Event dispatcher
//!
//! Bridges engine-thread callbacks to the caller thread. Frame ends and
//! breakpoint hits travel as tagged [`EngineSignal`]s over one channel so the
//! frame loop never has to reconcile a flag with a wakeup. Observers are
//! always invoked outside any lock.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use or_core::error::EngineResult;
use or_core::{AccessKind, EngineError};
use or_engine::{CoreParam, EmuState};
use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Region label passed to memory callbacks
pub const SYSTEM_BUS: &str = "System Bus";

/// Consumer of breakpoint-driven memory events
pub trait MemoryCallbacks: Send + Sync {
    fn on_read(&self, address: u32, region: &str);

    fn on_write(&self, address: u32, region: &str);

    fn on_execute(&self, address: u32, region: &str);
}

/// A breakpoint hit waiting to be delivered
#[derive(Clone)]
pub struct PendingBreakEvent {
    pub kind: AccessKind,
    pub address: u32,
    /// Consumer registered when the hit was reported
    pub target: Option<Arc<dyn MemoryCallbacks>>,
}

impl PendingBreakEvent {
    /// Deliver to the target. Consumes the event so it cannot be delivered
    /// twice.
    pub fn dispatch(self) {
        let Some(target) = self.target else {
            return;
        };
        match self.kind {
            AccessKind::Read => target.on_read(self.address, SYSTEM_BUS),
            AccessKind::Write => target.on_write(self.address, SYSTEM_BUS),
            AccessKind::Execute => target.on_execute(self.address, SYSTEM_BUS),
        }
    }
}

impl fmt::Debug for PendingBreakEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingBreakEvent")
            .field("kind", &self.kind)
            .field("address", &format_args!("0x{:08x}", self.address))
            .field("has_target", &self.target.is_some())
            .finish()
    }
}

/// Signal raised by the engine thread for the frame loop
#[derive(Debug, Clone)]
pub enum EngineSignal {
    FrameEnded,
    Breakpoint(PendingBreakEvent),
}

/// Which state operation a completion belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StateJob {
    Save,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Pending,
    Running,
    Exited,
}

#[derive(Debug)]
struct GateInner {
    outcome: GateState,
    /// Engine reported `EmuState::Running`
    engine_running: bool,
    /// Debugger init completed and the run state is Running
    debugger_ready: bool,
}

/// One-shot startup handshake.
///
/// Opens once the engine reports Running and its debugger has been brought
/// up, in either order. The worker exiting first fails it.
struct StartupGate {
    inner: Mutex<GateInner>,
    cond: Condvar,
}

impl StartupGate {
    fn new() -> Self {
        Self {
            inner: Mutex::new(GateInner {
                outcome: GateState::Pending,
                engine_running: false,
                debugger_ready: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut GateInner)) {
        let mut inner = self.inner.lock();
        if inner.outcome != GateState::Pending {
            return;
        }
        apply(&mut inner);
        if inner.engine_running && inner.debugger_ready {
            inner.outcome = GateState::Running;
        }
        if inner.outcome != GateState::Pending {
            self.cond.notify_all();
        }
    }

    fn wait(&self, timeout: Duration) -> EngineResult<()> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.outcome == GateState::Pending {
            if self.cond.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        match inner.outcome {
            GateState::Running => Ok(()),
            GateState::Exited => Err(EngineError::ExitedDuringStartup),
            GateState::Pending => Err(EngineError::StartupTimeout(timeout)),
        }
    }
}

type Observer = Arc<dyn Fn() + Send + Sync>;
type BreakpointObserver = Arc<dyn Fn(u32, AccessKind) + Send + Sync>;

#[derive(Default)]
struct Observers {
    frame_finished: Vec<Observer>,
    before_render: Vec<Observer>,
    breakpoint_hit: Vec<BreakpointObserver>,
    vertical_interrupt: Vec<Observer>,
}

/// Routes engine notifications to the frame loop and to observers
pub struct EventDispatcher {
    signal_tx: Sender<EngineSignal>,
    signal_rx: Receiver<EngineSignal>,
    state_tx: Sender<(StateJob, bool)>,
    state_rx: Receiver<(StateJob, bool)>,
    gate: StartupGate,
    observers: RwLock<Observers>,
    memory_callbacks: RwLock<Option<Arc<dyn MemoryCallbacks>>>,
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        let (signal_tx, signal_rx) = channel::unbounded();
        let (state_tx, state_rx) = channel::unbounded();
        Self {
            signal_tx,
            signal_rx,
            state_tx,
            state_rx,
            gate: StartupGate::new(),
            observers: RwLock::new(Observers::default()),
            memory_callbacks: RwLock::new(None),
        }
    }

    // Observer registration

    /// Called on the caller thread each time a frame advance completes
    pub fn on_frame_finished(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.observers.write().frame_finished.push(Arc::new(observer));
    }

    /// Called from the presentation thread before each draw
    pub fn on_before_render(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.observers.write().before_render.push(Arc::new(observer));
    }

    /// Called on the caller thread for every breakpoint hit
    pub fn on_breakpoint_hit(&self, observer: impl Fn(u32, AccessKind) + Send + Sync + 'static) {
        self.observers.write().breakpoint_hit.push(Arc::new(observer));
    }

    /// Called from the engine thread on every vertical interrupt
    pub fn on_vertical_interrupt(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.observers.write().vertical_interrupt.push(Arc::new(observer));
    }

    /// Install or clear the memory-callback consumer
    pub fn set_memory_callbacks(&self, target: Option<Arc<dyn MemoryCallbacks>>) {
        *self.memory_callbacks.write() = target;
    }

    pub fn has_memory_callbacks(&self) -> bool {
        self.memory_callbacks.read().is_some()
    }

    // Engine side

    pub(crate) fn frame_ended(&self) {
        // Both channel ends live in `self`, so sending cannot fail.
        let _ = self.signal_tx.send(EngineSignal::FrameEnded);
    }

    pub(crate) fn breakpoint(&self, kind: AccessKind, address: u32) {
        let target = self.memory_callbacks.read().clone();
        tracing::trace!("Breakpoint signal: {} at 0x{:08x}", kind, address);
        let _ = self.signal_tx.send(EngineSignal::Breakpoint(PendingBreakEvent {
            kind,
            address,
            target,
        }));
    }

    pub(crate) fn state_changed(&self, param: CoreParam, value: i32) {
        match param {
            CoreParam::EmuState => match EmuState::from_raw(value) {
                Some(EmuState::Running) => self.gate.update(|gate| gate.engine_running = true),
                Some(state) => tracing::debug!("Engine state now {:?}", state),
                None => tracing::warn!("Engine reported unknown emulator state {}", value),
            },
            CoreParam::StateSaveComplete => {
                let _ = self.state_tx.send((StateJob::Save, value != 0));
            }
            CoreParam::StateLoadComplete => {
                let _ = self.state_tx.send((StateJob::Load, value != 0));
            }
            other => tracing::trace!("Engine parameter {:?} changed to {}", other, value),
        }
    }

    /// The debugger-init transition to Running has completed
    pub(crate) fn debugger_ready(&self) {
        self.gate.update(|gate| gate.debugger_ready = true);
    }

    pub(crate) fn engine_exited(&self) {
        self.gate.update(|gate| gate.outcome = GateState::Exited);
    }

    // Caller side

    pub(crate) fn wait_for_startup(&self, timeout: Duration) -> EngineResult<()> {
        self.gate.wait(timeout)
    }

    pub(crate) fn drain_signals(&self) -> Vec<EngineSignal> {
        self.signal_rx.try_iter().collect()
    }

    pub(crate) fn next_signal(&self, timeout: Duration) -> Result<EngineSignal, RecvTimeoutError> {
        self.signal_rx.recv_timeout(timeout)
    }

    pub(crate) fn drain_state_jobs(&self) {
        self.state_rx.try_iter().for_each(drop);
    }

    /// Completion of `job`, or `None` if none arrived in time
    pub(crate) fn wait_state_job(&self, job: StateJob, timeout: Duration) -> Option<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.state_rx.recv_deadline(deadline) {
                Ok((kind, ok)) if kind == job => return Some(ok),
                Ok((kind, _)) => tracing::debug!("Ignoring stale {:?} completion", kind),
                Err(_) => return None,
            }
        }
    }

    // Observer fan-out

    pub(crate) fn emit_frame_finished(&self) {
        let observers = self.observers.read().frame_finished.clone();
        observers.iter().for_each(|observer| observer());
    }

    pub(crate) fn emit_before_render(&self) {
        let observers = self.observers.read().before_render.clone();
        observers.iter().for_each(|observer| observer());
    }

    pub(crate) fn emit_breakpoint_hit(&self, address: u32, kind: AccessKind) {
        let observers = self.observers.read().breakpoint_hit.clone();
        observers.iter().for_each(|observer| observer(address, kind));
    }

    pub(crate) fn emit_vertical_interrupt(&self) {
        let observers = self.observers.read().vertical_interrupt.clone();
        observers.iter().for_each(|observer| observer());
    }
}
