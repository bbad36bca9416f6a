//! Core types for the oxidized-reality session host
//!
//! This crate provides the foundational types, error handling,
//! configuration, and logging infrastructure shared by the engine
//! boundary and the session controller.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::Config;
pub use error::{EngineError, EngineResult, PluginError, Result, SessionError};
pub use types::{AccessKind, EngineStatus, ParamValue, PluginKind};
