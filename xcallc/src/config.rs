//!
//! Bridge Configuration
//!
//! Settings shared by all builds, loaded from TOML:
//!
//! ```toml
//! pointer_width = 64
//! verify_ir = true
//! emit_object = true
//! opt_level = "speed"
//!
//! [buffer]
//! data_offset = 0
//!
//! [targets.cpu]
//! isa = "host"
//!
//! [targets.gpu]
//! pointer_width = 64
//! ```
//!
//! A target's `isa` is `"host"` for the native ISA, a target triple, or
//! absent for an IR-only target that never produces machine code. A
//! `[targets]` table in the file replaces the default map, which only
//! contains `cpu` on the host ISA. Targets missing from the map are
//! IR-only with the default pointer width.
//!

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lowering::BufferLayout;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("unsupported pointer width {width} for target '{target}' (expected 32 or 64)")]
    InvalidPointerWidth { target: String, width: u8 },

    #[error("cannot create ISA for target '{target}': {reason}")]
    Isa { target: String, reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    pub fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub isa: Option<String>,
    /// Only used by IR-only targets; an ISA knows its own pointer width.
    pub pointer_width: Option<u8>,
}

impl TargetConfig {
    pub fn host() -> Self {
        Self {
            isa: Some("host".to_string()),
            pointer_width: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub pointer_width: u8,
    pub verify_ir: bool,
    pub emit_object: bool,
    pub opt_level: OptLevel,
    pub buffer: BufferLayout,
    pub targets: IndexMap<String, TargetConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let mut targets = IndexMap::new();
        targets.insert("cpu".to_string(), TargetConfig::host());
        Self {
            pointer_width: 64,
            verify_ir: true,
            emit_object: true,
            opt_level: OptLevel::Speed,
            buffer: BufferLayout::default(),
            targets,
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        tracing::debug!(path = %path.display(), targets = config.targets.len(), "loaded bridge config");
        Ok(config)
    }

    /// Configuration without native targets; every build is IR-only.
    pub fn ir_only() -> Self {
        Self {
            emit_object: false,
            targets: IndexMap::new(),
            ..Self::default()
        }
    }

    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.get(name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_width("<default>", self.pointer_width)?;
        for (name, target) in &self.targets {
            if let Some(width) = target.pointer_width {
                check_width(name, width)?;
            }
        }
        Ok(())
    }
}

fn check_width(target: &str, width: u8) -> Result<(), ConfigError> {
    match width {
        32 | 64 => Ok(()),
        _ => Err(ConfigError::InvalidPointerWidth {
            target: target.to_string(),
            width,
        }),
    }
}
