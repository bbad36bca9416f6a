//! The engine trait and its callback contracts

use crate::module::ModuleHandle;
use crate::types::{Breakpoint, BreakpointFlags, CoreParam, MemoryRegion, RunState};
use or_core::error::EngineResult;
use or_core::{ParamValue, PluginKind};
use std::path::Path;
use std::sync::Arc;

/// State-change notification: parameter and its new value
pub type StateCallback = Arc<dyn Fn(CoreParam, i32) + Send + Sync>;
/// Called on the engine thread once a frame is complete
pub type FrameCallback = Arc<dyn Fn() + Send + Sync>;
/// Called on every vertical interrupt
pub type ViCallback = Arc<dyn Fn() + Send + Sync>;
/// Called before the presentation shim draws
pub type RenderCallback = Arc<dyn Fn() + Send + Sync>;
/// Called once the engine's debugger is ready
pub type DebugInitCallback = Arc<dyn Fn() + Send + Sync>;
/// Called with the breakpoint index on a hit, or [`crate::STEP_SENTINEL`]
/// after a single step
pub type DebugUpdateCallback = Arc<dyn Fn(i32) + Send + Sync>;

/// Debugger callback set
#[derive(Clone, Default)]
pub struct DebugCallbacks {
    pub init: Option<DebugInitCallback>,
    pub update: Option<DebugUpdateCallback>,
    pub vi: Option<ViCallback>,
}

/// Callbacks registered outside the debugger
#[derive(Clone, Default)]
pub struct CoreCallbacks {
    pub frame: Option<FrameCallback>,
    pub render: Option<RenderCallback>,
}

/// Opaque handle to an engine configuration section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigSection(pub usize);

/// An emulation engine.
///
/// `execute` blocks on the worker thread for the whole life of the
/// emulation, so every other operation must be callable concurrently from
/// the caller thread.
pub trait Engine: Send + Sync {
    /// Image name the engine was loaded from
    fn name(&self) -> &str;

    /// Handle passed to plugins at startup
    fn module_handle(&self) -> ModuleHandle;

    // Lifecycle

    fn startup(
        &self,
        api_version: i32,
        config_dir: &Path,
        data_dir: &Path,
        on_state: StateCallback,
    ) -> EngineResult<()>;

    fn shutdown(&self) -> EngineResult<()>;

    // Configuration

    fn open_config_section(&self, name: &str) -> EngineResult<ConfigSection>;

    fn set_parameter(
        &self,
        section: ConfigSection,
        name: &str,
        value: &ParamValue,
    ) -> EngineResult<()>;

    // Execution

    fn open_image(&self, image: &[u8]) -> EngineResult<()>;

    fn close_image(&self) -> EngineResult<()>;

    fn set_core_callbacks(&self, callbacks: CoreCallbacks) -> EngineResult<()>;

    /// Run until stopped
    fn execute(&self) -> EngineResult<()>;

    fn stop(&self) -> EngineResult<()>;

    fn reset(&self, hard: bool) -> EngineResult<()>;

    fn advance_frame(&self) -> EngineResult<()>;

    // Plugins

    fn attach_plugin(&self, kind: PluginKind, module: ModuleHandle) -> EngineResult<()>;

    fn detach_plugin(&self, kind: PluginKind) -> EngineResult<()>;

    // Debugger

    fn set_debug_callbacks(&self, callbacks: DebugCallbacks) -> EngineResult<()>;

    fn set_run_state(&self, state: RunState) -> EngineResult<()>;

    fn step(&self) -> EngineResult<()>;

    /// Install a breakpoint, returning its table index
    fn add_breakpoint(&self, breakpoint: Breakpoint) -> EngineResult<u32>;

    fn remove_breakpoint(&self, index: u32) -> EngineResult<()>;

    /// Index of a breakpoint overlapping the range and carrying `flags`
    fn lookup_breakpoint(&self, address: u32, size: u32, flags: BreakpointFlags) -> Option<u32>;

    /// Flags and address of the most recent hit
    fn breakpoint_triggered_by(&self) -> (BreakpointFlags, u32);

    // State

    fn save_state(&self, path: &Path) -> EngineResult<()>;

    fn load_state(&self, path: &Path) -> EngineResult<()>;

    fn save_ram(&self, dest: &mut [u8]) -> EngineResult<()>;

    fn load_ram(&self, src: &[u8]) -> EngineResult<()>;

    // Memory

    /// Size of `region` in bytes, 0 if the engine does not expose it
    fn memory_size(&self, region: MemoryRegion) -> usize;

    /// Copy `dest.len()` bytes of `region` starting at `offset`
    fn read_memory(&self, region: MemoryRegion, offset: usize, dest: &mut [u8]) -> EngineResult<()>;
}
