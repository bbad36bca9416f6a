//! Engine boundary for the oxidized-reality session host
//!
//! The session controller never emulates anything itself. It drives an
//! [`Engine`] through the fixed operation set defined here and receives
//! events through a fixed set of callbacks. Two implementations exist:
//!
//! - [`native`]: binds a mupen64plus-compatible core and its plugins from
//!   shared libraries.
//! - [`simulated`]: an in-process core that runs scripted memory accesses,
//!   used by tests and headless dry runs.

pub mod engine;
pub mod module;
pub mod native;
pub mod simulated;
pub mod types;

pub use engine::{
    ConfigSection, CoreCallbacks, DebugCallbacks, DebugInitCallback, DebugUpdateCallback,
    Engine, FrameCallback, RenderCallback, StateCallback, ViCallback,
};
pub use module::{ModuleHandle, ModuleLoader, PluginModule};
pub use native::NativeLoader;
pub use simulated::{ScriptedAccess, SimulatedEngine, SimulatedLoader};
pub use types::{
    Breakpoint, BreakpointFlags, CoreParam, EmuState, MemoryRegion, RunState, API_VERSION,
    BREAKPOINT_WIDTH, SAVE_RAM_SIZE, STEP_SENTINEL,
};
