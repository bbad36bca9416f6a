//! Native engine binding
//!
//! Loads a mupen64plus-compatible core and its plugins as shared libraries
//! through `libloading`. The core's callbacks carry no user context, so they
//! are routed through a process-wide slot; this is sound because the core
//! itself can only be initialized once per process.

mod ffi;

use crate::engine::{
    ConfigSection, CoreCallbacks, DebugCallbacks, Engine, FrameCallback, RenderCallback,
    StateCallback,
};
use crate::module::{ModuleHandle, ModuleLoader, PluginModule};
use crate::types::{Breakpoint, BreakpointFlags, CoreParam, MemoryRegion, RunState};
use ffi::{command, message_level, breakpoint_command, M64pHandle, RawBreakpoint};
use libloading::Library;
use once_cell::sync::Lazy;
use or_core::error::EngineResult;
use or_core::{EngineError, EngineStatus, ParamValue, PluginError, PluginKind};
use parking_lot::RwLock;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_uint, c_void};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Callbacks reachable from the C trampolines
#[derive(Default)]
struct CallbackSlot {
    state: Option<StateCallback>,
    frame: Option<FrameCallback>,
    render: Option<RenderCallback>,
    debug: DebugCallbacks,
}

static CALLBACKS: Lazy<RwLock<CallbackSlot>> = Lazy::new(|| RwLock::new(CallbackSlot::default()));

/// Run a callback without letting a panic unwind into C
fn guarded(name: &str, f: impl FnOnce()) {
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).is_err() {
        tracing::error!("Panic in {} callback stopped at the engine boundary", name);
    }
}

extern "C" fn on_state_changed(_context: *mut c_void, param: c_int, value: c_int) {
    let Some(param) = CoreParam::from_raw(param) else {
        return;
    };
    let callback = CALLBACKS.read().state.clone();
    if let Some(callback) = callback {
        guarded("state", || callback(param, value));
    }
}

extern "C" fn on_frame() {
    let callback = CALLBACKS.read().frame.clone();
    if let Some(callback) = callback {
        guarded("frame", || callback());
    }
}

extern "C" fn on_debug_init() {
    let callback = CALLBACKS.read().debug.init.clone();
    if let Some(callback) = callback {
        guarded("debug init", || callback());
    }
}

extern "C" fn on_debug_update(breakpoint: c_int) {
    let callback = CALLBACKS.read().debug.update.clone();
    if let Some(callback) = callback {
        guarded("debug update", || callback(breakpoint));
    }
}

extern "C" fn on_debug_vi() {
    let callback = CALLBACKS.read().debug.vi.clone();
    if let Some(callback) = callback {
        guarded("vertical interrupt", || callback());
    }
}

extern "C" fn on_debug_message(_context: *mut c_void, level: c_int, message: *const c_char) {
    if message.is_null() {
        return;
    }
    // SAFETY: the core passes a NUL-terminated string valid for the call.
    let text = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    match level {
        message_level::ERROR => tracing::error!(target: "engine", "{}", text),
        message_level::WARNING => tracing::warn!(target: "engine", "{}", text),
        message_level::INFO | message_level::STATUS => tracing::info!(target: "engine", "{}", text),
        _ => tracing::debug!(target: "engine", "{}", text),
    }
}

/// Fire the registered before-render callback.
///
/// Called by the video extension shim from whatever thread it renders on.
pub fn notify_before_render() {
    let callback = CALLBACKS.read().render.clone();
    if let Some(callback) = callback {
        guarded("render", || callback());
    }
}

fn cstring(value: &str) -> EngineResult<CString> {
    CString::new(value).map_err(|_| EngineError::Status {
        command: "string argument",
        status: EngineStatus::InputInvalid,
    })
}

fn path_cstring(path: &Path) -> EngineResult<CString> {
    cstring(&path.to_string_lossy())
}

/// Open a shared library and recover its raw OS handle
#[cfg(unix)]
fn open_module(path: &Path) -> Result<(Library, ModuleHandle), libloading::Error> {
    // SAFETY: loading runs the module's initializers; modules are trusted
    // engine components chosen by the user.
    let library = unsafe { libloading::os::unix::Library::new(path)? };
    let raw = library.into_raw();
    // SAFETY: `raw` was produced by `into_raw` just above.
    let library = unsafe { libloading::os::unix::Library::from_raw(raw) };
    Ok((Library::from(library), ModuleHandle(raw as usize)))
}

#[cfg(windows)]
fn open_module(path: &Path) -> Result<(Library, ModuleHandle), libloading::Error> {
    // SAFETY: see the unix variant.
    let library = unsafe { libloading::os::windows::Library::new(path)? };
    let raw = library.into_raw();
    // SAFETY: `raw` was produced by `into_raw` just above.
    let library = unsafe { libloading::os::windows::Library::from_raw(raw) };
    Ok((Library::from(library), ModuleHandle(raw as usize)))
}

/// Resolve a symbol and copy out the function pointer
///
/// # Safety
/// `T` must match the symbol's real signature.
unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> Result<T, String> {
    let bytes = format!("{}\0", name);
    library
        .get::<T>(bytes.as_bytes())
        .map(|sym| *sym)
        .map_err(|e| format!("missing symbol {}: {}", name, e))
}

/// Resolved core entry points
struct CoreApi {
    startup: ffi::CoreStartupFn,
    shutdown: ffi::CoreShutdownFn,
    attach_plugin: ffi::CoreAttachPluginFn,
    detach_plugin: ffi::CoreDetachPluginFn,
    do_command: ffi::CoreDoCommandFn,
    config_open_section: ffi::ConfigOpenSectionFn,
    config_set_parameter: ffi::ConfigSetParameterFn,
    debug_set_callbacks: ffi::DebugSetCallbacksFn,
    debug_set_run_state: ffi::DebugSetRunStateFn,
    debug_step: ffi::DebugStepFn,
    breakpoint_lookup: ffi::DebugBreakpointLookupFn,
    breakpoint_command: ffi::DebugBreakpointCommandFn,
    breakpoint_triggered_by: ffi::DebugBreakpointTriggeredByFn,
    save_ram: Option<ffi::SaveRamFn>,
    load_ram: Option<ffi::LoadRamFn>,
    mem_pointer: Option<ffi::DebugMemGetPointerFn>,
    mem_info: Option<ffi::DebugMemGetMemInfoFn>,
}

impl CoreApi {
    /// # Safety
    /// `library` must be a mupen64plus core built with debugger support.
    unsafe fn resolve(library: &Library) -> Result<Self, String> {
        Ok(Self {
            startup: symbol(library, "CoreStartup")?,
            shutdown: symbol(library, "CoreShutdown")?,
            attach_plugin: symbol(library, "CoreAttachPlugin")?,
            detach_plugin: symbol(library, "CoreDetachPlugin")?,
            do_command: symbol(library, "CoreDoCommand")?,
            config_open_section: symbol(library, "ConfigOpenSection")?,
            config_set_parameter: symbol(library, "ConfigSetParameter")?,
            debug_set_callbacks: symbol(library, "DebugSetCallbacks")?,
            debug_set_run_state: symbol(library, "DebugSetRunState")?,
            debug_step: symbol(library, "DebugStep")?,
            breakpoint_lookup: symbol(library, "DebugBreakpointLookup")?,
            breakpoint_command: symbol(library, "DebugBreakpointCommand")?,
            breakpoint_triggered_by: symbol(library, "DebugBreakpointTriggeredBy")?,
            save_ram: symbol(library, "save_saveram").ok(),
            load_ram: symbol(library, "load_saveram").ok(),
            mem_pointer: symbol(library, "DebugMemGetPointer").ok(),
            mem_info: symbol(library, "DebugMemGetMemInfo").ok(),
        })
    }
}

/// A core loaded from a shared library
pub struct NativeEngine {
    image: String,
    handle: ModuleHandle,
    api: CoreApi,
    /// Dropped last so no entry point outlives the mapping
    _library: Library,
}

impl NativeEngine {
    fn command(
        &self,
        label: &'static str,
        cmd: c_int,
        param_int: c_int,
        param_ptr: *mut c_void,
    ) -> EngineResult<()> {
        // SAFETY: entry point resolved from the live library; pointer
        // arguments are valid for the duration of the call.
        let code = unsafe { (self.api.do_command)(cmd, param_int, param_ptr) };
        EngineError::check(label, EngineStatus::from_raw(code))
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        *CALLBACKS.write() = CallbackSlot::default();
        tracing::debug!("Unloading engine module {}", self.image);
    }
}

impl Engine for NativeEngine {
    fn name(&self) -> &str {
        &self.image
    }

    fn module_handle(&self) -> ModuleHandle {
        self.handle
    }

    fn startup(
        &self,
        api_version: i32,
        config_dir: &Path,
        data_dir: &Path,
        on_state: StateCallback,
    ) -> EngineResult<()> {
        CALLBACKS.write().state = Some(on_state);
        let config_dir = path_cstring(config_dir)?;
        let data_dir = path_cstring(data_dir)?;
        // SAFETY: strings outlive the call; trampolines are 'static.
        let code = unsafe {
            (self.api.startup)(
                api_version,
                config_dir.as_ptr(),
                data_dir.as_ptr(),
                std::ptr::null_mut(),
                Some(on_debug_message),
                std::ptr::null_mut(),
                Some(on_state_changed),
            )
        };
        let status = EngineStatus::from_raw(code);
        if status.is_success() {
            Ok(())
        } else {
            Err(EngineError::Startup(format!("CoreStartup returned {}", status)))
        }
    }

    fn shutdown(&self) -> EngineResult<()> {
        // SAFETY: entry point resolved from the live library.
        let code = unsafe { (self.api.shutdown)() };
        EngineError::check("CoreShutdown", EngineStatus::from_raw(code))
    }

    fn open_config_section(&self, name: &str) -> EngineResult<ConfigSection> {
        let name = cstring(name)?;
        let mut handle: M64pHandle = std::ptr::null_mut();
        // SAFETY: `handle` is a valid out-pointer.
        let code = unsafe { (self.api.config_open_section)(name.as_ptr(), &mut handle) };
        EngineError::check("ConfigOpenSection", EngineStatus::from_raw(code))?;
        Ok(ConfigSection(handle as usize))
    }

    fn set_parameter(
        &self,
        section: ConfigSection,
        name: &str,
        value: &ParamValue,
    ) -> EngineResult<()> {
        let name = cstring(name)?;
        let handle = section.0 as M64pHandle;
        let tag = value.type_tag();
        let set = self.api.config_set_parameter;
        // SAFETY: each value pointer refers to a local that outlives the call.
        let code = unsafe {
            match value {
                ParamValue::Int(v) => set(handle, name.as_ptr(), tag, v as *const i32 as *const c_void),
                ParamValue::Float(v) => set(handle, name.as_ptr(), tag, v as *const f32 as *const c_void),
                ParamValue::Bool(v) => {
                    let raw: c_int = *v as c_int;
                    set(handle, name.as_ptr(), tag, &raw as *const c_int as *const c_void)
                }
                ParamValue::String(v) => {
                    let raw = cstring(v)?;
                    set(handle, name.as_ptr(), tag, raw.as_ptr() as *const c_void)
                }
            }
        };
        EngineError::check("ConfigSetParameter", EngineStatus::from_raw(code))
    }

    fn open_image(&self, image: &[u8]) -> EngineResult<()> {
        let len = c_int::try_from(image.len()).map_err(|_| EngineError::Status {
            command: "CoreDoCommand(ROM_OPEN)",
            status: EngineStatus::InputInvalid,
        })?;
        // The core copies the image before returning.
        self.command(
            "CoreDoCommand(ROM_OPEN)",
            command::ROM_OPEN,
            len,
            image.as_ptr() as *mut c_void,
        )
    }

    fn close_image(&self) -> EngineResult<()> {
        self.command("CoreDoCommand(ROM_CLOSE)", command::ROM_CLOSE, 0, std::ptr::null_mut())
    }

    fn set_core_callbacks(&self, callbacks: CoreCallbacks) -> EngineResult<()> {
        {
            let mut slot = CALLBACKS.write();
            slot.frame = callbacks.frame;
            slot.render = callbacks.render;
        }
        self.command(
            "CoreDoCommand(SET_FRAME_CALLBACK)",
            command::SET_FRAME_CALLBACK,
            0,
            on_frame as ffi::VoidFn as *mut c_void,
        )
    }

    fn execute(&self) -> EngineResult<()> {
        self.command("CoreDoCommand(EXECUTE)", command::EXECUTE, 0, std::ptr::null_mut())
    }

    fn stop(&self) -> EngineResult<()> {
        self.command("CoreDoCommand(STOP)", command::STOP, 0, std::ptr::null_mut())
    }

    fn reset(&self, hard: bool) -> EngineResult<()> {
        self.command(
            "CoreDoCommand(RESET)",
            command::RESET,
            hard as c_int,
            std::ptr::null_mut(),
        )
    }

    fn advance_frame(&self) -> EngineResult<()> {
        self.command(
            "CoreDoCommand(ADVANCE_FRAME)",
            command::ADVANCE_FRAME,
            0,
            std::ptr::null_mut(),
        )
    }

    fn attach_plugin(&self, kind: PluginKind, module: ModuleHandle) -> EngineResult<()> {
        // SAFETY: `module` is a live handle owned by the plugin registry.
        let code = unsafe { (self.api.attach_plugin)(kind.raw(), module.as_ptr()) };
        EngineError::check("CoreAttachPlugin", EngineStatus::from_raw(code))
    }

    fn detach_plugin(&self, kind: PluginKind) -> EngineResult<()> {
        // SAFETY: entry point resolved from the live library.
        let code = unsafe { (self.api.detach_plugin)(kind.raw()) };
        EngineError::check("CoreDetachPlugin", EngineStatus::from_raw(code))
    }

    fn set_debug_callbacks(&self, callbacks: DebugCallbacks) -> EngineResult<()> {
        let want_vi = callbacks.vi.is_some();
        CALLBACKS.write().debug = callbacks;
        let vi: Option<ffi::VoidFn> = if want_vi { Some(on_debug_vi) } else { None };
        // SAFETY: trampolines are 'static.
        let code = unsafe {
            (self.api.debug_set_callbacks)(Some(on_debug_init), Some(on_debug_update), vi)
        };
        EngineError::check("DebugSetCallbacks", EngineStatus::from_raw(code))
    }

    fn set_run_state(&self, state: RunState) -> EngineResult<()> {
        // SAFETY: entry point resolved from the live library.
        let code = unsafe { (self.api.debug_set_run_state)(state.raw()) };
        EngineError::check("DebugSetRunState", EngineStatus::from_raw(code))
    }

    fn step(&self) -> EngineResult<()> {
        // SAFETY: entry point resolved from the live library.
        let code = unsafe { (self.api.debug_step)() };
        EngineError::check("DebugStep", EngineStatus::from_raw(code))
    }

    fn add_breakpoint(&self, breakpoint: Breakpoint) -> EngineResult<u32> {
        let mut raw = RawBreakpoint {
            address: breakpoint.start,
            endaddr: breakpoint.end,
            flags: breakpoint.flags.bits(),
        };
        // SAFETY: `raw` is a valid m64p_breakpoint for the call.
        let index = unsafe {
            (self.api.breakpoint_command)(breakpoint_command::ADD_STRUCT, 0, &mut raw)
        };
        breakpoint_result("DebugBreakpointCommand(ADD_STRUCT)", index, EngineStatus::NoMemory)
    }

    fn remove_breakpoint(&self, index: u32) -> EngineResult<()> {
        let mut unused = RawBreakpoint::default();
        // SAFETY: `unused` is a valid m64p_breakpoint for the call.
        let code = unsafe {
            (self.api.breakpoint_command)(breakpoint_command::REMOVE_IDX, index, &mut unused)
        };
        breakpoint_result("DebugBreakpointCommand(REMOVE_IDX)", code, EngineStatus::InputInvalid)
            .map(|_| ())
    }

    fn lookup_breakpoint(&self, address: u32, size: u32, flags: BreakpointFlags) -> Option<u32> {
        // SAFETY: entry point resolved from the live library.
        let index = unsafe { (self.api.breakpoint_lookup)(address, size, flags.bits()) };
        u32::try_from(index).ok()
    }

    fn breakpoint_triggered_by(&self) -> (BreakpointFlags, u32) {
        let mut flags = 0u32;
        let mut address = 0u32;
        // SAFETY: both out-pointers are valid locals.
        unsafe { (self.api.breakpoint_triggered_by)(&mut flags, &mut address) };
        (BreakpointFlags::from_bits_truncate(flags), address)
    }

    fn save_state(&self, path: &Path) -> EngineResult<()> {
        let path = path_cstring(path)?;
        self.command(
            "CoreDoCommand(STATE_SAVE)",
            command::STATE_SAVE,
            ffi::STATE_FORMAT_M64P,
            path.as_ptr() as *mut c_void,
        )
    }

    fn load_state(&self, path: &Path) -> EngineResult<()> {
        let path = path_cstring(path)?;
        self.command(
            "CoreDoCommand(STATE_LOAD)",
            command::STATE_LOAD,
            0,
            path.as_ptr() as *mut c_void,
        )
    }

    fn save_ram(&self, dest: &mut [u8]) -> EngineResult<()> {
        match self.api.save_ram {
            Some(save) => {
                // SAFETY: the core writes exactly SAVE_RAM_SIZE bytes and the
                // caller sized `dest` accordingly.
                unsafe { save(dest.as_mut_ptr()) };
            }
            None => {
                tracing::debug!("{} has no save_saveram export, returning blank save RAM", self.image);
                dest.fill(0);
            }
        }
        Ok(())
    }

    fn load_ram(&self, src: &[u8]) -> EngineResult<()> {
        let load = self.api.load_ram.ok_or(EngineError::Unsupported("load_saveram"))?;
        // SAFETY: the core reads exactly SAVE_RAM_SIZE bytes; the session
        // validates the length first.
        unsafe { load(src.as_ptr()) };
        Ok(())
    }

    fn memory_size(&self, region: MemoryRegion) -> usize {
        let Some(info) = self.api.mem_info else {
            return 0;
        };
        // SAFETY: entry point resolved from the live library.
        let size = unsafe { info(ffi::MEM_INFO_REGION_SIZE, region.raw() as c_uint) };
        usize::try_from(size).unwrap_or(0)
    }

    fn read_memory(&self, region: MemoryRegion, offset: usize, dest: &mut [u8]) -> EngineResult<()> {
        let get_pointer = self
            .api
            .mem_pointer
            .ok_or(EngineError::Unsupported("DebugMemGetPointer"))?;
        let range = region.checked_range(self.memory_size(region), offset, dest.len())?;
        // SAFETY: entry point resolved from the live library.
        let base = unsafe { get_pointer(region.raw()) } as *const u8;
        if base.is_null() {
            return Err(EngineError::Unsupported("DebugMemGetPointer"));
        }
        // SAFETY: the core maps `memory_size(region)` bytes at `base` for as
        // long as the image is open, and `range` lies within them.
        let source = unsafe { std::slice::from_raw_parts(base.add(range.start), range.len()) };
        dest.copy_from_slice(source);
        Ok(())
    }
}

/// Decode a breakpoint command result: an index, or a negative failure code
fn breakpoint_result(command: &'static str, code: c_int, status: EngineStatus) -> EngineResult<u32> {
    u32::try_from(code).map_err(|_| EngineError::Status { command, status })
}

/// A plugin loaded from a shared library
pub struct NativePlugin {
    kind: PluginKind,
    image: String,
    handle: ModuleHandle,
    startup: ffi::PluginStartupFn,
    shutdown: ffi::PluginShutdownFn,
    _library: Library,
}

impl PluginModule for NativePlugin {
    fn kind(&self) -> PluginKind {
        self.kind
    }

    fn image(&self) -> &str {
        &self.image
    }

    fn handle(&self) -> ModuleHandle {
        self.handle
    }

    fn startup(&self, engine: ModuleHandle) -> EngineStatus {
        // SAFETY: `engine` is the live core handle; the trampoline is 'static.
        let code = unsafe { (self.startup)(engine.as_ptr(), std::ptr::null_mut(), Some(on_debug_message)) };
        EngineStatus::from_raw(code)
    }

    fn shutdown(&self) -> EngineStatus {
        // SAFETY: entry point resolved from the live library.
        EngineStatus::from_raw(unsafe { (self.shutdown)() })
    }
}

impl Drop for NativePlugin {
    fn drop(&mut self) {
        tracing::debug!("Unloading {} plugin {}", self.kind, self.image);
    }
}

/// Loads engine and plugin images from disk
#[derive(Debug, Clone, Default)]
pub struct NativeLoader {
    search_dirs: Vec<PathBuf>,
}

impl NativeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory searched for bare image names
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    /// Map an image name to a library path.
    ///
    /// Existing paths are used as-is; bare names get the platform's library
    /// prefix and suffix and are looked up in the search directories, then
    /// left to the system loader.
    pub fn resolve(&self, image: &str) -> PathBuf {
        let direct = Path::new(image);
        if direct.is_file() {
            return direct.to_path_buf();
        }
        let file_name = libloading::library_filename(image);
        self.search_dirs
            .iter()
            .map(|dir| dir.join(&file_name))
            .find(|candidate| candidate.is_file())
            .unwrap_or_else(|| PathBuf::from(file_name))
    }
}

impl ModuleLoader for NativeLoader {
    fn load_engine(&self, image: &str) -> EngineResult<Arc<dyn Engine>> {
        let path = self.resolve(image);
        tracing::info!("Loading engine module {}", path.display());
        let load_error = |reason: String| EngineError::Load {
            image: image.to_string(),
            reason,
        };

        let (library, handle) = open_module(&path).map_err(|e| load_error(e.to_string()))?;
        // SAFETY: the image is expected to be a mupen64plus core.
        let api = unsafe { CoreApi::resolve(&library) }.map_err(load_error)?;

        Ok(Arc::new(NativeEngine {
            image: image.to_string(),
            handle,
            api,
            _library: library,
        }))
    }

    fn load_plugin(
        &self,
        kind: PluginKind,
        image: &str,
    ) -> Result<Box<dyn PluginModule>, PluginError> {
        let path = self.resolve(image);
        tracing::debug!("Loading {} plugin {}", kind, path.display());
        let load_error = |reason: String| PluginError::Load {
            kind,
            image: image.to_string(),
            reason,
        };

        let (library, handle) = open_module(&path).map_err(|e| load_error(e.to_string()))?;
        // SAFETY: plugin entry points share one signature across plugin kinds.
        let (startup, shutdown) = unsafe {
            (
                symbol::<ffi::PluginStartupFn>(&library, "PluginStartup").map_err(load_error)?,
                symbol::<ffi::PluginShutdownFn>(&library, "PluginShutdown").map_err(load_error)?,
            )
        };

        Ok(Box::new(NativePlugin {
            kind,
            image: image.to_string(),
            handle,
            startup,
            shutdown,
            _library: library,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_keeps_existing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("core.bin");
        std::fs::write(&lib, b"not really a library").unwrap();

        let loader = NativeLoader::new();
        assert_eq!(loader.resolve(lib.to_str().unwrap()), lib);
    }

    #[test]
    fn test_resolve_searches_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let file_name = libloading::library_filename("mupen64plus-audio-test");
        let lib = dir.path().join(&file_name);
        std::fs::write(&lib, b"").unwrap();

        let loader = NativeLoader::new().with_search_dir(dir.path());
        assert_eq!(loader.resolve("mupen64plus-audio-test"), lib);
        assert_eq!(loader.resolve("mupen64plus-missing"), PathBuf::from(libloading::library_filename("mupen64plus-missing")));
    }

    #[test]
    fn test_breakpoint_command_results() {
        assert_eq!(
            breakpoint_result("DebugBreakpointCommand(ADD_STRUCT)", 3, EngineStatus::NoMemory).unwrap(),
            3
        );
        let err = breakpoint_result("DebugBreakpointCommand(REMOVE_IDX)", -1, EngineStatus::InputInvalid)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Status {
                command: "DebugBreakpointCommand(REMOVE_IDX)",
                status: EngineStatus::InputInvalid,
            }
        ));
    }

    #[test]
    fn test_missing_engine_is_load_error() {
        let loader = NativeLoader::new();
        let err = match loader.load_engine("/nonexistent/oxidized-reality-core") {
            Ok(_) => panic!("loading a missing core must fail"),
            Err(err) => err,
        };
        assert!(matches!(err, EngineError::Load { .. }));
    }

    #[test]
    fn test_missing_plugin_is_load_error() {
        let loader = NativeLoader::new();
        let err = match loader.load_plugin(PluginKind::Audio, "/nonexistent/audio-plugin") {
            Ok(_) => panic!("loading a missing plugin must fail"),
            Err(err) => err,
        };
        assert!(matches!(err, PluginError::Load { kind: PluginKind::Audio, .. }));
    }

    #[test]
    fn test_debug_message_tolerates_null() {
        on_debug_message(std::ptr::null_mut(), message_level::ERROR, std::ptr::null());
        let text = CString::new("core status line").unwrap();
        on_debug_message(std::ptr::null_mut(), message_level::STATUS, text.as_ptr());
    }
}
