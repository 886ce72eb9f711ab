//! TOML configuration: run defaults, service name, logging, large-file scan,
//! and an optional task matrix override.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{RclError, Result};
use crate::logger::session::LogFormat;
use crate::reclaim::defaults;
use crate::reclaim::matrix::{CleanupTask, TaskMatrix};
use crate::reclaim::removal::AgeBasis;

/// Upper bound for any age threshold: a century.
pub const MAX_AGE_DAYS: u32 = 36_500;

/// Full configuration model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub large_files: LargeFileConfig,
    /// Replaces the built-in matrix when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<CleanupTask>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Default threshold for age-filtered tasks without their own age.
    pub age_days: u32,
    /// Which timestamp decides an entry's age.
    pub age_basis: AgeBasis,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            age_days: 30,
            age_basis: AgeBasis::Created,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Background update agent paused around service-sensitive tasks.
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: defaults::default_service_name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for session logs; the system temp directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// File-name stem; the run timestamp is appended.
    pub stem: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            stem: "disk-reclaim".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    #[must_use]
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LargeFileConfig {
    /// Scan root; the system drive root when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Lowercase extensions without the dot.
    pub extensions: Vec<String>,
    pub min_size_bytes: u64,
    /// Maximum number of files listed.
    pub top: usize,
}

impl Default for LargeFileConfig {
    fn default() -> Self {
        Self {
            root: None,
            extensions: ["iso", "vhd", "vhdx", "msu"]
                .into_iter()
                .map(String::from)
                .collect(),
            min_size_bytes: 0,
            top: 25,
        }
    }
}

impl Config {
    /// Default config location: `<config_dir>/disk-reclaim/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("disk-reclaim")
            .join("config.toml")
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default path is used when
    /// present and built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(RclError::MissingConfig {
                        path: path.to_path_buf(),
                    });
                }
                Self::from_file(path)?
            }
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| RclError::io(path, e))?;
        Self::from_toml(&raw)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.age_days > MAX_AGE_DAYS {
            return Err(RclError::InvalidConfig {
                details: format!(
                    "run.age_days = {} exceeds {MAX_AGE_DAYS}",
                    self.run.age_days
                ),
            });
        }
        if self.service.name.trim().is_empty() {
            return Err(RclError::InvalidConfig {
                details: "service.name must not be empty".to_string(),
            });
        }
        if self.logging.stem.trim().is_empty()
            || self.logging.stem.contains(['/', '\\'])
        {
            return Err(RclError::InvalidConfig {
                details: format!("logging.stem {:?} is not a file-name stem", self.logging.stem),
            });
        }
        if self.large_files.top == 0 {
            return Err(RclError::InvalidConfig {
                details: "large_files.top must be at least 1".to_string(),
            });
        }
        self.matrix().map(|_| ())
    }

    /// The configured task matrix, or the built-in one for this platform.
    pub fn matrix(&self) -> Result<TaskMatrix> {
        match &self.tasks {
            Some(tasks) => TaskMatrix::new(tasks.clone()),
            None => Ok(defaults::default_matrix()),
        }
    }
}
