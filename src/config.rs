//! Packaging options: archive format and block compression settings.
//!
//! Options resolve in three layers: built-in defaults, an optional JSON file,
//! then `AIPBAG_*` environment variables.  The CLI applies its flags last.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bag::ArchiveFormat;
use crate::codec::CodecId;
use crate::container::{DEFAULT_CHUNK_SIZE, DEFAULT_COMPRESSION_LEVEL};

pub const ENV_FORMAT: &str = "AIPBAG_FORMAT";
pub const ENV_CODEC:  &str = "AIPBAG_CODEC";
pub const ENV_LEVEL:  &str = "AIPBAG_LEVEL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unknown archive format: {0}")]
    UnknownFormat(String),
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),
    #[error("Invalid compression level: {0}")]
    InvalidLevel(String),
    #[error("Config file error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BagOptions {
    pub format:     ArchiveFormat,
    /// Block codec for the native container.  `tar.zst` always uses zstd.
    pub codec:      CodecId,
    pub level:      i32,
    pub chunk_size: usize,
}

impl Default for BagOptions {
    fn default() -> Self {
        Self {
            format:     ArchiveFormat::Zbag,
            codec:      CodecId::Zstd,
            level:      DEFAULT_COMPRESSION_LEVEL,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl BagOptions {
    /// Defaults, overlaid with `path` if given, then with the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut options = match path {
            Some(p) => {
                tracing::debug!("loading bag options from {}", p.display());
                Self::load_from_file(p)?
            }
            None => Self::default(),
        };
        options.apply_env()?;
        Ok(options)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = env::var(ENV_FORMAT) {
            self.set_format(&v)?;
        }
        if let Ok(v) = env::var(ENV_CODEC) {
            self.set_codec(&v)?;
        }
        if let Ok(v) = env::var(ENV_LEVEL) {
            self.level = v.parse().map_err(|_| ConfigError::InvalidLevel(v))?;
        }
        Ok(())
    }

    pub fn set_format(&mut self, name: &str) -> Result<(), ConfigError> {
        self.format = ArchiveFormat::from_name(name)
            .ok_or_else(|| ConfigError::UnknownFormat(name.to_owned()))?;
        Ok(())
    }

    pub fn set_codec(&mut self, name: &str) -> Result<(), ConfigError> {
        self.codec = CodecId::from_name(name)
            .ok_or_else(|| ConfigError::UnknownCodec(name.to_owned()))?;
        Ok(())
    }
}
