//! Raw C ABI of a mupen64plus-compatible core and its plugins

use std::os::raw::{c_char, c_int, c_uint, c_void};

pub type M64pHandle = *mut c_void;

pub type DebugMessageFn = extern "C" fn(context: *mut c_void, level: c_int, message: *const c_char);
pub type StateChangedFn = extern "C" fn(context: *mut c_void, param: c_int, value: c_int);
pub type VoidFn = extern "C" fn();
pub type DebugUpdateFn = extern "C" fn(breakpoint: c_int);

pub type CoreStartupFn = unsafe extern "C" fn(
    api_version: c_int,
    config_path: *const c_char,
    data_path: *const c_char,
    debug_context: *mut c_void,
    debug_callback: Option<DebugMessageFn>,
    state_context: *mut c_void,
    state_callback: Option<StateChangedFn>,
) -> c_int;
pub type CoreShutdownFn = unsafe extern "C" fn() -> c_int;
pub type CoreAttachPluginFn = unsafe extern "C" fn(plugin_type: c_int, handle: M64pHandle) -> c_int;
pub type CoreDetachPluginFn = unsafe extern "C" fn(plugin_type: c_int) -> c_int;
pub type CoreDoCommandFn =
    unsafe extern "C" fn(command: c_int, param_int: c_int, param_ptr: *mut c_void) -> c_int;
pub type ConfigOpenSectionFn =
    unsafe extern "C" fn(name: *const c_char, handle: *mut M64pHandle) -> c_int;
pub type ConfigSetParameterFn = unsafe extern "C" fn(
    handle: M64pHandle,
    name: *const c_char,
    param_type: c_int,
    value: *const c_void,
) -> c_int;
pub type DebugSetCallbacksFn = unsafe extern "C" fn(
    init: Option<VoidFn>,
    update: Option<DebugUpdateFn>,
    vi: Option<VoidFn>,
) -> c_int;
pub type DebugSetRunStateFn = unsafe extern "C" fn(state: c_int) -> c_int;
pub type DebugStepFn = unsafe extern "C" fn() -> c_int;
pub type DebugBreakpointLookupFn =
    unsafe extern "C" fn(address: c_uint, size: c_uint, flags: c_uint) -> c_int;
pub type DebugBreakpointCommandFn =
    unsafe extern "C" fn(command: c_int, index: c_uint, breakpoint: *mut RawBreakpoint) -> c_int;
pub type DebugBreakpointTriggeredByFn = unsafe extern "C" fn(flags: *mut u32, address: *mut u32);
pub type DebugMemGetPointerFn = unsafe extern "C" fn(ptr_type: c_int) -> *mut c_void;
pub type DebugMemGetMemInfoFn = unsafe extern "C" fn(info: c_int, address: c_uint) -> c_int;
pub type SaveRamFn = unsafe extern "C" fn(dest: *mut u8) -> *mut c_void;
pub type LoadRamFn = unsafe extern "C" fn(src: *const u8) -> *mut c_void;

pub type PluginStartupFn = unsafe extern "C" fn(
    core_handle: M64pHandle,
    context: *mut c_void,
    debug_callback: Option<DebugMessageFn>,
) -> c_int;
pub type PluginShutdownFn = unsafe extern "C" fn() -> c_int;

/// `m64p_breakpoint`
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct RawBreakpoint {
    pub address: u32,
    pub endaddr: u32,
    pub flags: u32,
}

/// `m64p_command` values
pub mod command {
    use std::os::raw::c_int;

    pub const ROM_OPEN: c_int = 1;
    pub const ROM_CLOSE: c_int = 2;
    pub const EXECUTE: c_int = 5;
    pub const STOP: c_int = 6;
    pub const STATE_LOAD: c_int = 10;
    pub const STATE_SAVE: c_int = 11;
    pub const SET_FRAME_CALLBACK: c_int = 15;
    pub const RESET: c_int = 19;
    pub const ADVANCE_FRAME: c_int = 20;
}

/// `m64p_dbg_bkp_command` values
pub mod breakpoint_command {
    use std::os::raw::c_int;

    pub const ADD_STRUCT: c_int = 2;
    pub const REMOVE_IDX: c_int = 6;
}

/// `m64p_dbg_mem_info` selector for the byte size of a memory region
pub const MEM_INFO_REGION_SIZE: c_int = 5;

/// `m64p_msg_level` values
pub mod message_level {
    use std::os::raw::c_int;

    pub const ERROR: c_int = 1;
    pub const WARNING: c_int = 2;
    pub const INFO: c_int = 3;
    pub const STATUS: c_int = 4;
}

/// Native savestate format selector for `STATE_SAVE`
pub const STATE_FORMAT_M64P: c_int = 1;
