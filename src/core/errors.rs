//! RCL-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, RclError>;

/// Top-level error type for the reclamation engine.
///
/// Only start-up problems surface as errors: per-path and per-task failures
/// during a run are recorded in reports instead.
#[derive(Debug, Error)]
pub enum RclError {
    #[error("[RCL-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[RCL-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[RCL-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[RCL-1004] invalid path pattern {pattern:?}: {details}")]
    Pattern { pattern: String, details: String },

    #[error("[RCL-2001] volume snapshot failure: {details}")]
    Snapshot { details: String },

    #[error("[RCL-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[RCL-3001] permission denied for {path}")]
    PermissionDenied { path: PathBuf },

    #[error("[RCL-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[RCL-3003] external process {program} failed: {details}")]
    Process { program: String, details: String },

    #[error("[RCL-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl RclError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "RCL-1001",
            Self::MissingConfig { .. } => "RCL-1002",
            Self::ConfigParse { .. } => "RCL-1003",
            Self::Pattern { .. } => "RCL-1004",
            Self::Snapshot { .. } => "RCL-2001",
            Self::Serialization { .. } => "RCL-2101",
            Self::PermissionDenied { .. } => "RCL-3001",
            Self::Io { .. } => "RCL-3002",
            Self::Process { .. } => "RCL-3003",
            Self::Runtime { .. } => "RCL-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Snapshot { .. } | Self::Process { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    ///
    /// Permission failures are mapped to [`RclError::PermissionDenied`] so
    /// callers can report them without inspecting the source.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            return Self::PermissionDenied {
                path: path.as_ref().to_path_buf(),
            };
        }
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for RclError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for RclError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for RclError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
