//! Debugger run-state machine
//!
//! ```text
//! Paused  --debugger init-->  Running
//! Running --breakpoint-->     Paused
//! Paused  --resume-->         Running
//! Running --step-->           Stepping --step done--> Paused
//! ```

use or_core::error::EngineResult;
use or_engine::{Engine, RunState};
use parking_lot::Mutex;

/// Controller-side view of the engine's run state
#[derive(Debug, Default)]
pub struct RunStateMachine {
    state: Mutex<RunState>,
}

impl RunStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// The engine's debugger is ready; start free running
    pub fn on_debugger_initialized(&self, engine: &dyn Engine) -> EngineResult<()> {
        let mut state = self.state.lock();
        engine.set_run_state(RunState::Running)?;
        *state = RunState::Running;
        Ok(())
    }

    /// The engine paused itself on a breakpoint
    pub fn on_break_reported(&self) {
        *self.state.lock() = RunState::Paused;
    }

    /// A single step finished
    pub fn on_step_completed(&self) {
        let mut state = self.state.lock();
        if *state == RunState::Stepping {
            *state = RunState::Paused;
        }
    }

    /// Set running and release the engine with exactly one step.
    ///
    /// Both commands are issued under the state lock so no other transition
    /// can interleave.
    pub fn resume(&self, engine: &dyn Engine) -> EngineResult<()> {
        let mut state = self.state.lock();
        engine.set_run_state(RunState::Running)?;
        engine.step()?;
        *state = RunState::Running;
        Ok(())
    }

    pub fn pause(&self, engine: &dyn Engine) -> EngineResult<()> {
        let mut state = self.state.lock();
        engine.set_run_state(RunState::Paused)?;
        *state = RunState::Paused;
        Ok(())
    }

    /// Execute one instruction and pause again
    pub fn step(&self, engine: &dyn Engine) -> EngineResult<()> {
        let mut state = self.state.lock();
        engine.set_run_state(RunState::Stepping)?;
        engine.step()?;
        *state = RunState::Stepping;
        Ok(())
    }
}
