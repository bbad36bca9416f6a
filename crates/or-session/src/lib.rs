//! Emulation session controller
//!
//! Owns an engine running on a dedicated worker thread and turns its
//! callback-driven execution into a synchronous, frame-at-a-time API:
//!
//! - [`Session`]: lifecycle, frame advance, state save/restore, teardown
//! - [`PluginRegistry`]: optional engine modules, one per kind
//! - [`BreakpointTable`]: 4-byte watchpoints keyed by access kind
//! - [`RunStateMachine`]: paused/stepping/running transitions
//! - [`EventDispatcher`]: engine signals, observers and memory callbacks

pub mod breakpoints;
pub mod events;
pub mod plugins;
pub mod run_state;
mod savestate;
pub mod session;

pub use breakpoints::BreakpointTable;
pub use events::{EngineSignal, EventDispatcher, MemoryCallbacks, PendingBreakEvent, SYSTEM_BUS};
pub use plugins::PluginRegistry;
pub use run_state::RunStateMachine;
pub use session::Session;
