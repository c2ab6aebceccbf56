//! Config file handling. Command-line flags are layered on top in `cli`.

use std::path::{Path, PathBuf};

use pagedl_engine::PipelineConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, Result};

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
    /// JSON manifest describing items and their streams.
    pub manifest: Option<PathBuf>,
    /// External danmaku XML to ASS converter.
    pub danmaku_converter: Option<DanmakuConverterConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DanmakuConverterConfig {
    pub program: String,
    /// `{input}` and `{output}` are replaced with the XML and ASS paths.
    pub args: Vec<String>,
}

impl Default for DanmakuConverterConfig {
    fn default() -> Self {
        Self {
            program: "DanmakuFactory".to_string(),
            args: ["-i", "{input}", "-o", "{output}"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl AppConfig {
    /// `<config dir>/pagedl/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pagedl").join("config.toml"))
    }

    /// Load `path`, or the default location when `path` is `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if explicit {
                return Err(AppError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)?;
        let config = Self::parse(&text)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
