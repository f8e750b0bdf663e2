use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};

/// default bound on simultaneously open destination files
pub const DEFAULT_MAX_CONCURRENT_WRITES: usize = 32;

/// file name looked up in the working directory when no config is given
pub const CONFIG_FILE_NAME: &str = "metaconv.toml";

/// project configuration stored in metaconv.toml
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// directory relative source-format paths are rooted under
    pub default_directory: Option<PathBuf>,
    /// maximum number of destination files written at the same time
    pub max_concurrent_writes: usize,
    /// registry data replacing the builtin type registry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<PathBuf>,
    /// glob patterns of paths skipped during resolution
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignore: Vec<String>,
}

impl Config {
    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let mut config: Config = toml::from_str(&content)?;
        if config.max_concurrent_writes == 0 {
            config.max_concurrent_writes = 1;
        }
        Ok(config)
    }

    /// load config from file if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }

    /// set the default output directory
    pub fn with_default_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.default_directory = Some(dir.into());
        self
    }

    /// compiled ignore patterns, invalid patterns are skipped
    pub fn ignore_patterns(&self) -> Vec<glob::Pattern> {
        self.ignore
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    tracing::warn!("ignoring invalid pattern {:?}: {}", p, e);
                    None
                }
            })
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_directory: None,
            max_concurrent_writes: DEFAULT_MAX_CONCURRENT_WRITES,
            registry: None,
            ignore: vec![],
        }
    }
}
