//! External program execution and the per-run tool lookup cache.

#![allow(missing_docs)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::core::errors::{RclError, Result};
use crate::platform::pal::{ProcessExit, ProcessRunner};

/// Runs programs found on `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn locate(&self, program: &str) -> Option<PathBuf> {
        let candidate = Path::new(program);
        if candidate.components().count() > 1 {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .flat_map(|dir| executable_names(program).map(move |name| dir.join(name)))
            .find(|path| path.is_file())
    }

    fn run(&self, program: &Path, args: &[String]) -> Result<ProcessExit> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| RclError::Process {
                program: program.display().to_string(),
                details: err.to_string(),
            })?;
        Ok(ProcessExit {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

fn executable_names(program: &str) -> impl Iterator<Item = String> + '_ {
    let has_ext = Path::new(program).extension().is_some();
    let suffixes: &[&str] = if cfg!(windows) && !has_ext {
        &[".exe", ".com", ".bat", ".cmd"]
    } else {
        &[""]
    };
    suffixes.iter().map(move |suffix| format!("{program}{suffix}"))
}

/// Resolves each external tool at most once per run.
///
/// Absent tools are cached too, so a missing utility is reported once and
/// never searched for again.
pub struct ExternalTools<'a> {
    runner: &'a dyn ProcessRunner,
    cache: RefCell<HashMap<String, Option<PathBuf>>>,
}

impl<'a> ExternalTools<'a> {
    #[must_use]
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self {
            runner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Cached [`ProcessRunner::locate`].
    pub fn locate(&self, program: &str) -> Option<PathBuf> {
        if let Some(hit) = self.cache.borrow().get(program) {
            return hit.clone();
        }
        let found = self.runner.locate(program);
        self.cache
            .borrow_mut()
            .insert(program.to_string(), found.clone());
        found
    }

    pub fn run(&self, program: &Path, args: &[String]) -> Result<ProcessExit> {
        self.runner.run(program, args)
    }

    /// Number of distinct programs looked up so far.
    #[must_use]
    pub fn lookups(&self) -> usize {
        self.cache.borrow().len()
    }
}
