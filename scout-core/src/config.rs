use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the watcher process is launched
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct CompassConfig {
    /// argv prefix; the project directory and flags are appended
    #[serde(default = "default_command")]
    pub command: Vec<String>,
}

impl Default for CompassConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
        }
    }
}

fn default_command() -> Vec<String> {
    vec!["compass".into(), "watch".into()]
}

fn default_log_capacity() -> usize {
    5000
}

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ScoutConfig {
    /// Where the project table lives (defaults to the platform data dir)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Suffix of the project table name, e.g. `-test` gives `projects-test.json`
    #[serde(default)]
    pub env: String,

    #[serde(default)]
    pub compass: CompassConfig,

    /// Log entries kept per project
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            env: String::new(),
            compass: CompassConfig::default(),
            log_capacity: default_log_capacity(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("compass command is empty")]
    EmptyCommand,
    #[error("log_capacity must be greater than zero")]
    ZeroLogCapacity,
}

/// Outcome of config discovery, returned so the caller can report it once
/// logging is set up.
#[derive(Clone, Debug)]
pub struct Discovery {
    /// File the config was read from; `None` means defaults
    pub path: Option<PathBuf>,
    pub config: ScoutConfig,
    /// `SCOUT_CONFIG` value that named a file that does not exist
    pub missing_env_path: Option<PathBuf>,
}

impl Discovery {
    pub fn found(path: PathBuf, config: ScoutConfig) -> Self {
        Self {
            path: Some(path),
            config,
            missing_env_path: None,
        }
    }
}

const FILE_NAMES: [&str; 3] = ["scout.yaml", "scout.yml", ".scout.yaml"];

impl ScoutConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: ScoutConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Find a config file: `SCOUT_CONFIG`, then `start_dir` and its parents,
    /// then the user config dir. No file at all yields the defaults.
    pub fn discover(start_dir: &Path) -> Result<Discovery, ConfigError> {
        let env_path = std::env::var_os("SCOUT_CONFIG").map(PathBuf::from);
        Self::discover_from(env_path, start_dir)
    }

    /// [`Self::discover`] with the `SCOUT_CONFIG` value passed in
    pub fn discover_from(
        env_path: Option<PathBuf>,
        start_dir: &Path,
    ) -> Result<Discovery, ConfigError> {
        let mut missing = None;
        if let Some(path) = env_path {
            if path.exists() {
                let config = Self::load(&path)?;
                return Ok(Discovery::found(path, config));
            }
            missing = Some(path);
        }

        let mut dir = Some(start_dir);
        let mut found = None;
        'search: while let Some(current) = dir {
            for name in FILE_NAMES {
                let path = current.join(name);
                if path.exists() {
                    found = Some(path);
                    break 'search;
                }
            }
            dir = current.parent();
        }
        if found.is_none() {
            found = dirs::config_dir()
                .map(|user| user.join("scout").join("scout.yaml"))
                .filter(|path| path.exists());
        }

        let mut discovery = match found {
            Some(path) => {
                let config = Self::load(&path)?;
                Discovery::found(path, config)
            }
            None => Discovery {
                path: None,
                config: Self::default(),
                missing_env_path: None,
            },
        };
        discovery.missing_env_path = missing;
        Ok(discovery)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.compass.command.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigError::EmptyCommand);
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::ZeroLogCapacity);
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("scout")
        })
    }

    /// Path of the project table file
    pub fn table_path(&self) -> PathBuf {
        self.data_dir().join(format!("projects{}.json", self.env))
    }
}
