//! Configuration system for the oxidized-reality session host

use crate::error::{Result, SessionError};
use crate::types::{ParamValue, PluginKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub core: CoreConfig,
    pub video: VideoConfig,
    pub plugins: PluginConfig,
    pub session: SessionConfig,
    pub paths: PathConfig,
    pub debug: DebugConfig,
}

/// Engine `Core` section settings applied at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub emulator: CpuEmulator,
    /// Disable the 4MB expansion memory
    pub disable_expansion_memory: bool,
    pub save_type: SaveType,
}

/// R4300 emulator mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum CpuEmulator {
    PureInterpreter,
    CachedInterpreter,
    #[default]
    DynamicRecompiler,
}

impl CpuEmulator {
    pub fn raw(self) -> i32 {
        match self {
            Self::PureInterpreter => 0,
            Self::CachedInterpreter => 1,
            Self::DynamicRecompiler => 2,
        }
    }
}

/// Cartridge save type override
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum SaveType {
    /// Leave the engine's own detection in place
    #[default]
    Auto,
    Eeprom4k,
    Eeprom16k,
    Sram,
    FlashRam,
    ControllerPack,
    None,
}

impl SaveType {
    /// Raw `SaveType` parameter value, or `None` when it should not be set
    pub fn raw(self) -> Option<i32> {
        match self {
            Self::Auto => None,
            Self::Eeprom4k => Some(1),
            Self::Eeprom16k => Some(2),
            Self::Sram => Some(3),
            Self::FlashRam => Some(4),
            Self::ControllerPack => Some(5),
            Self::None => Some(6),
        }
    }
}

/// Video settings pushed into the engine's config sections
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub plugin: VideoPlugin,
    pub width: i32,
    pub height: i32,
    /// Extra parameters for the plugin-specific section
    pub parameters: BTreeMap<String, ParamValue>,
}

/// Known video plugin families
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum VideoPlugin {
    Rice,
    Glide64,
    Glide64Mk2,
    #[default]
    GLideN64,
}

impl VideoPlugin {
    /// Name of the plugin's config section
    pub fn section_name(self) -> &'static str {
        match self {
            Self::Rice => "Video-Rice",
            Self::Glide64 => "Video-Glide64",
            Self::Glide64Mk2 => "Video-Glide64mk2",
            Self::GLideN64 => "Video-GLideN64",
        }
    }

    /// Default module image name for this plugin
    pub fn default_image(self) -> &'static str {
        match self {
            Self::Rice => "mupen64plus-video-rice",
            Self::Glide64 => "mupen64plus-video-glide64",
            Self::Glide64Mk2 => "mupen64plus-video-glide64mk2",
            Self::GLideN64 => "mupen64plus-video-GLideN64",
        }
    }
}

/// Plugin module images attached at session start
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PluginConfig {
    pub graphics: Option<String>,
    pub audio: Option<String>,
    pub input: Option<String>,
    pub rsp: Option<String>,
}

impl PluginConfig {
    /// Configured image for a plugin kind
    pub fn image(&self, kind: PluginKind) -> Option<&str> {
        match kind {
            PluginKind::Graphics => self.graphics.as_deref(),
            PluginKind::Audio => self.audio.as_deref(),
            PluginKind::Input => self.input.as_deref(),
            PluginKind::Rsp => self.rsp.as_deref(),
        }
    }

    /// Configured plugins in attach order (graphics, audio, input, rsp)
    pub fn configured(&self) -> Vec<(PluginKind, &str)> {
        PluginKind::TEARDOWN_ORDER
            .iter()
            .filter_map(|&kind| self.image(kind).map(|image| (kind, image)))
            .collect()
    }
}

/// Session timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long start waits for the engine to report running
    pub startup_timeout_ms: u64,
    /// Wait slice of the frame loop between liveness checks
    pub poll_interval_ms: u64,
    /// How long teardown keeps re-sending stop
    pub stop_timeout_ms: u64,
    pub stop_retry_interval_ms: u64,
    /// How long save/load state waits for the completion notification
    pub state_timeout_ms: u64,
}

impl SessionConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn stop_retry_interval(&self) -> Duration {
        Duration::from_millis(self.stop_retry_interval_ms.max(1))
    }

    pub fn state_timeout(&self) -> Duration {
        Duration::from_millis(self.state_timeout_ms)
    }
}

/// Directories handed to the engine at startup; empty disables lookup
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PathConfig {
    pub engine_config: PathBuf,
    pub engine_data: PathBuf,
}

/// Debug settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DebugConfig {
    pub log_level: LogLevel,
}

/// Logging level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

// Default implementations

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            emulator: CpuEmulator::default(),
            disable_expansion_memory: false,
            save_type: SaveType::default(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            plugin: VideoPlugin::default(),
            width: 320,
            height: 240,
            parameters: BTreeMap::new(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            startup_timeout_ms: 10_000,
            poll_interval_ms: 200,
            stop_timeout_ms: 5_000,
            stop_retry_interval_ms: 10,
            state_timeout_ms: 2_000,
        }
    }
}

impl Config {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if path.exists() {
            Self::load_from(&path)
        } else {
            let config = Self::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| SessionError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SessionError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        tracing::debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("oxidized-reality")
            .join("config.toml")
    }
}
