//! Small value types shared across the engine boundary

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of memory access that can trigger a breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessKind {
    Read,
    Write,
    Execute,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::Execute => write!(f, "execute"),
        }
    }
}

/// Optional engine module slot
///
/// Discriminants match the engine's plugin type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum PluginKind {
    /// Auxiliary signal processor (RSP)
    Rsp = 1,
    /// Graphics
    Graphics = 2,
    /// Audio
    Audio = 3,
    /// Controller input
    Input = 4,
}

impl PluginKind {
    /// Fixed detach order used during teardown
    pub const TEARDOWN_ORDER: [PluginKind; 4] = [
        PluginKind::Graphics,
        PluginKind::Audio,
        PluginKind::Input,
        PluginKind::Rsp,
    ];

    /// Raw engine plugin type code
    pub fn raw(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsp => write!(f, "rsp"),
            Self::Graphics => write!(f, "graphics"),
            Self::Audio => write!(f, "audio"),
            Self::Input => write!(f, "input"),
        }
    }
}

/// Typed engine configuration value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    String(String),
}

impl ParamValue {
    /// Engine parameter type tag
    pub fn type_tag(&self) -> i32 {
        match self {
            Self::Int(_) => 1,
            Self::Float(_) => 2,
            Self::Bool(_) => 3,
            Self::String(_) => 4,
        }
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// Status code returned by engine entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum EngineStatus {
    Success = 0,
    NotInit,
    AlreadyInit,
    Incompatible,
    InputAssert,
    InputInvalid,
    InputNotFound,
    NoMemory,
    Files,
    Internal,
    InvalidState,
    PluginFail,
    SystemFail,
    Unsupported,
    WrongType,
}

impl EngineStatus {
    /// Decode a raw status code; unknown codes map to `Internal`
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::NotInit,
            2 => Self::AlreadyInit,
            3 => Self::Incompatible,
            4 => Self::InputAssert,
            5 => Self::InputInvalid,
            6 => Self::InputNotFound,
            7 => Self::NoMemory,
            8 => Self::Files,
            10 => Self::InvalidState,
            11 => Self::PluginFail,
            12 => Self::SystemFail,
            13 => Self::Unsupported,
            14 => Self::WrongType,
            _ => Self::Internal,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Success => "success",
            Self::NotInit => "not initialized",
            Self::AlreadyInit => "already initialized",
            Self::Incompatible => "incompatible API version",
            Self::InputAssert => "invalid parameters",
            Self::InputInvalid => "invalid input data",
            Self::InputNotFound => "item not found",
            Self::NoMemory => "out of memory",
            Self::Files => "file error",
            Self::Internal => "internal error",
            Self::InvalidState => "invalid state",
            Self::PluginFail => "plugin failure",
            Self::SystemFail => "system failure",
            Self::Unsupported => "unsupported",
            Self::WrongType => "wrong parameter type",
        };
        write!(f, "{}", text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_decoding() {
        assert_eq!(EngineStatus::from_raw(0), EngineStatus::Success);
        assert_eq!(EngineStatus::from_raw(11), EngineStatus::PluginFail);
        assert_eq!(EngineStatus::from_raw(9), EngineStatus::Internal);
        assert_eq!(EngineStatus::from_raw(-3), EngineStatus::Internal);
        assert!(EngineStatus::Success.is_success());
    }

    #[test]
    fn test_param_type_tags() {
        assert_eq!(ParamValue::Int(3).type_tag(), 1);
        assert_eq!(ParamValue::Float(0.5).type_tag(), 2);
        assert_eq!(ParamValue::Bool(true).type_tag(), 3);
        assert_eq!(ParamValue::from("x").type_tag(), 4);
    }

    #[test]
    fn test_teardown_order_covers_every_kind() {
        let order = PluginKind::TEARDOWN_ORDER;
        assert_eq!(order[0], PluginKind::Graphics);
        assert_eq!(order[3], PluginKind::Rsp);
        assert_eq!(PluginKind::Input.raw(), 4);
    }
}
