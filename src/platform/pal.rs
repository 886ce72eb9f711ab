//! Platform abstraction layer: privilege detection, volume enumeration, service
//! control and external process execution.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::errors::Result;
use crate::core::tier::PrivilegeLevel;

/// Capacity and free space of one fixed volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeUsage {
    /// Stable identifier (mount point or drive letter).
    pub id: String,
    pub mount_point: PathBuf,
    pub file_system: String,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl VolumeUsage {
    #[must_use]
    pub fn free_pct(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let pct = self.free_bytes as f64 / self.total_bytes as f64 * 100.0;
        pct
    }
}

/// Outcome of a service stop or start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "details", rename_all = "kebab-case")]
pub enum ServiceActionResult {
    /// The service changed state because of this request.
    Done,
    NotInstalled,
    /// Already stopped (for stop) or running (for start).
    AlreadyInState,
    Failed(String),
}

/// Stop/start by service name.
pub trait ServiceManager {
    fn stop(&self, name: &str) -> ServiceActionResult;
    fn start(&self, name: &str) -> ServiceActionResult;
}

/// Exit status and captured output of an external process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessExit {
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Locates and runs external programs.
pub trait ProcessRunner {
    /// Absolute path of `program`, or `None` when it is not installed.
    fn locate(&self, program: &str) -> Option<PathBuf>;
    /// Run to completion, capturing output.
    fn run(&self, program: &Path, args: &[String]) -> Result<ProcessExit>;
}

/// Everything the orchestrator needs from the operating system.
pub trait Platform {
    fn privilege_level(&self) -> PrivilegeLevel;
    /// Fixed local volumes only: no removable, network or optical media.
    fn fixed_volumes(&self) -> Result<Vec<VolumeUsage>>;
    fn host_name(&self) -> String;
    fn service_manager(&self) -> &dyn ServiceManager;
    fn process_runner(&self) -> &dyn ProcessRunner;
}
