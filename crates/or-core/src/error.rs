//! Error types for the oxidized-reality session host

use crate::types::{AccessKind, EngineStatus, PluginKind};
use std::time::Duration;
use thiserror::Error;

/// Main error type for session operations
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Engine crashed while advancing a frame")]
    EngineCrashed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine rejected {0}")]
    EngineRejected(String),

    #[error("No {kind} breakpoint at 0x{address:08x}")]
    BreakpointNotFound { kind: AccessKind, address: u32 },

    #[error("Session has been torn down")]
    SessionClosed,

    #[error("Engine did not acknowledge stop within {0:?}")]
    StopTimeout(Duration),

    #[error("Save RAM must be {expected} bytes, got {actual}")]
    SaveRamSize { expected: usize, actual: usize },

    #[error("Config error: {0}")]
    Config(String),
}

/// Errors raised at the engine boundary
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to load engine module {image}: {reason}")]
    Load { image: String, reason: String },

    #[error("Engine startup failed: {0}")]
    Startup(String),

    #[error("{command} failed: {status}")]
    Status {
        command: &'static str,
        status: EngineStatus,
    },

    #[error("Engine did not reach running state within {0:?}")]
    StartupTimeout(Duration),

    #[error("Engine thread exited before reaching running state")]
    ExitedDuringStartup,

    #[error("Operation not supported by engine: {0}")]
    Unsupported(&'static str),

    #[error("{len} bytes at 0x{offset:x} fall outside {region} (0x{size:x} bytes)")]
    RegionBounds {
        region: &'static str,
        offset: usize,
        len: usize,
        size: usize,
    },
}

impl EngineError {
    /// Turn a raw status into `Ok` or a `Status` error for `command`
    pub fn check(command: &'static str, status: EngineStatus) -> EngineResult<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(EngineError::Status { command, status })
        }
    }
}

/// Plugin attach errors; every variant implies a full rollback
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Failed to load {kind} plugin {image}: {reason}")]
    Load {
        kind: PluginKind,
        image: String,
        reason: String,
    },

    #[error("{kind} plugin {image} failed to start: {status}")]
    Startup {
        kind: PluginKind,
        image: String,
        status: EngineStatus,
    },

    #[error("Engine refused to attach {kind} plugin {image}: {reason}")]
    Attach {
        kind: PluginKind,
        image: String,
        reason: String,
    },
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Result type alias for engine boundary calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;
