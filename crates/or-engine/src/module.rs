//! Loadable modules: the engine image and its plugins

use crate::engine::Engine;
use or_core::error::EngineResult;
use or_core::{EngineStatus, PluginError, PluginKind};
use std::sync::Arc;

/// Raw handle of a loaded module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(pub usize);

impl ModuleHandle {
    pub fn as_ptr(self) -> *mut std::ffi::c_void {
        self.0 as *mut std::ffi::c_void
    }
}

/// A loaded plugin module.
///
/// Dropping the module unloads it.
pub trait PluginModule: Send {
    fn kind(&self) -> PluginKind;

    fn image(&self) -> &str;

    fn handle(&self) -> ModuleHandle;

    /// Run the plugin's startup entry point against the engine module
    fn startup(&self, engine: ModuleHandle) -> EngineStatus;

    /// Run the plugin's shutdown entry point
    fn shutdown(&self) -> EngineStatus;
}

/// Resolves module images into live modules
pub trait ModuleLoader: Send + Sync {
    fn load_engine(&self, image: &str) -> EngineResult<Arc<dyn Engine>>;

    fn load_plugin(&self, kind: PluginKind, image: &str)
        -> Result<Box<dyn PluginModule>, PluginError>;
}
