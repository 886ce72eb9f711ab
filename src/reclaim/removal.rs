//! Best-effort removal of filesystem entries matched by a task pattern.
//!
//! Two modes share one enumeration and one failure policy:
//!
//! * **age-filtered**: remove entries whose timestamp is strictly older than
//!   `now - age`. Timestamps are captured before anything is deleted and
//!   entries are processed deepest-first, so a directory is only removed when
//!   it is itself old *and* empty once its old children are gone.
//! * **unconditional**: remove every candidate root outright.
//!
//! Every per-entry failure is classified, logged and recorded; nothing here
//! returns an error to the caller.

use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::core::paths::{PathContext, resolve_pattern};
use crate::logger::session::{LogLevel, LogRecord, RunLog};

const SECS_PER_DAY: u64 = 86_400;

/// Which timestamp decides an entry's age.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeBasis {
    /// Creation (birth) time, falling back to modification time where the
    /// filesystem does not report it.
    #[default]
    Created,
    /// Last modification time.
    Modified,
}

impl AgeBasis {
    fn timestamp(self, meta: &Metadata) -> Option<SystemTime> {
        match self {
            Self::Created => meta.created().or_else(|_| meta.modified()).ok(),
            Self::Modified => meta.modified().ok(),
        }
    }
}

impl FromStr for AgeBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" | "creation" => Ok(Self::Created),
            "modified" | "mtime" => Ok(Self::Modified),
            other => Err(format!(
                "unknown age basis '{other}' (expected created or modified)"
            )),
        }
    }
}

/// Why an entry was not removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "details", rename_all = "kebab-case")]
pub enum SkipReason {
    PermissionDenied,
    InUse,
    /// Disappeared between enumeration and deletion.
    Vanished,
    /// Old directory that still holds younger entries.
    NotEmpty,
    Enumeration(String),
    Io(String),
}

impl SkipReason {
    /// Classify an I/O failure from a removal call.
    #[must_use]
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::NotFound => Self::Vanished,
            io::ErrorKind::DirectoryNotEmpty => Self::NotEmpty,
            io::ErrorKind::ResourceBusy | io::ErrorKind::ExecutableFileBusy => Self::InUse,
            // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
            _ if cfg!(windows) && matches!(err.raw_os_error(), Some(32 | 33)) => Self::InUse,
            _ => Self::Io(err.to_string()),
        }
    }

    /// Expected outcomes that are not worth a warning.
    #[must_use]
    pub const fn is_benign(&self) -> bool {
        matches!(self, Self::Vanished | Self::NotEmpty)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::InUse => f.write_str("in use"),
            Self::Vanished => f.write_str("vanished before removal"),
            Self::NotEmpty => f.write_str("retains younger entries"),
            Self::Enumeration(msg) => write!(f, "enumeration failed: {msg}"),
            Self::Io(msg) => f.write_str(msg),
        }
    }
}

/// One removed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedEntry {
    pub path: PathBuf,
    pub bytes: u64,
}

/// One entry that was a removal candidate but could not be removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Aggregated outcome of one pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    /// Paths the pattern resolved to.
    pub matched_roots: usize,
    pub removed: Vec<RemovedEntry>,
    pub skipped: Vec<SkippedEntry>,
    /// Entries kept because they are younger than the cutoff.
    pub retained: usize,
    pub bytes_freed: u64,
}

impl RemovalReport {
    /// Fold another report into this one.
    pub fn absorb(&mut self, other: Self) {
        self.matched_roots += other.matched_roots;
        self.removed.extend(other.removed);
        self.skipped.extend(other.skipped);
        self.retained += other.retained;
        self.bytes_freed += other.bytes_freed;
    }

    fn record_removed(&mut self, path: &Path, bytes: u64, log: &mut dyn RunLog) {
        log.emit(
            LogRecord::new(
                LogLevel::Verbose,
                "removed",
                format!("Removed {} ({bytes} bytes)", path.display()),
            )
            .with_path(path),
        );
        self.bytes_freed += bytes;
        self.removed.push(RemovedEntry {
            path: path.to_path_buf(),
            bytes,
        });
    }

    fn record_skipped(&mut self, path: &Path, reason: SkipReason, log: &mut dyn RunLog) {
        let level = if reason.is_benign() {
            LogLevel::Verbose
        } else {
            LogLevel::Warn
        };
        log.emit(
            LogRecord::new(
                level,
                "skipped",
                format!("Could not remove {}: {reason}", path.display()),
            )
            .with_path(path),
        );
        self.skipped.push(SkippedEntry {
            path: path.to_path_buf(),
            reason,
        });
    }
}

/// Deletion calls, abstracted so locked or protected entries can be simulated.
pub trait EntryOps {
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    fn remove_dir(&self, path: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// [`EntryOps`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdEntryOps;

impl EntryOps for StdEntryOps {
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }
}

static STD_OPS: StdEntryOps = StdEntryOps;

#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    is_dir: bool,
    timestamp: Option<SystemTime>,
    size: u64,
}

/// Pattern-driven remover bound to one path context.
pub struct Remover<'a> {
    paths: &'a PathContext,
    ops: &'a dyn EntryOps,
    basis: AgeBasis,
    now: SystemTime,
}

impl<'a> Remover<'a> {
    #[must_use]
    pub fn new(paths: &'a PathContext, basis: AgeBasis) -> Self {
        Self {
            paths,
            ops: &STD_OPS,
            basis,
            now: SystemTime::now(),
        }
    }

    #[must_use]
    pub fn with_ops(mut self, ops: &'a dyn EntryOps) -> Self {
        self.ops = ops;
        self
    }

    /// Evaluate ages against a fixed instant instead of the wall clock.
    #[must_use]
    pub fn with_now(mut self, now: SystemTime) -> Self {
        self.now = now;
        self
    }

    /// Remove entries under `pattern` older than `age_days`.
    pub fn remove_older_than(
        &self,
        pattern: &str,
        age_days: u32,
        log: &mut dyn RunLog,
    ) -> RemovalReport {
        let age = Duration::from_secs(u64::from(age_days) * SECS_PER_DAY);
        let cutoff = self.now.checked_sub(age).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = RemovalReport::default();
        let Some(roots) = self.resolve(pattern, &mut report, log) else {
            return report;
        };

        for (root, include_root) in roots {
            let candidates = self.enumerate(&root, include_root, &mut report, log);
            // Pre-order reversed: descendants come before their ancestors.
            for candidate in candidates.into_iter().rev() {
                let is_old = candidate.timestamp.is_some_and(|ts| ts < cutoff);
                if !is_old {
                    report.retained += 1;
                    continue;
                }
                let result = if candidate.is_dir {
                    self.ops.remove_dir(&candidate.path)
                } else {
                    self.remove_leaf(&candidate.path)
                };
                match result {
                    Ok(()) => report.record_removed(&candidate.path, candidate.size, log),
                    Err(err) => {
                        report.record_skipped(&candidate.path, SkipReason::from_io(&err), log);
                    }
                }
            }
        }
        report
    }

    /// Remove everything `pattern` names, regardless of age.
    pub fn remove_all(&self, pattern: &str, log: &mut dyn RunLog) -> RemovalReport {
        let mut report = RemovalReport::default();
        let Some(roots) = self.resolve(pattern, &mut report, log) else {
            return report;
        };

        for (root, include_root) in roots {
            if include_root {
                self.remove_tree(&root, &mut report, log);
                continue;
            }
            let children = match std::fs::read_dir(&root) {
                Ok(children) => children,
                Err(err) => {
                    report.record_skipped(&root, SkipReason::Enumeration(err.to_string()), log);
                    continue;
                }
            };
            for child in children {
                match child {
                    Ok(child) => self.remove_tree(&child.path(), &mut report, log),
                    Err(err) => report.record_skipped(
                        &root,
                        SkipReason::Enumeration(err.to_string()),
                        log,
                    ),
                }
            }
        }
        report
    }

    /// Resolve the pattern into `(root, include_root)` pairs.
    ///
    /// A literal directory stands for its contents, so the root itself is not
    /// a candidate. `None` means the pattern could not be used at all.
    fn resolve(
        &self,
        pattern: &str,
        report: &mut RemovalReport,
        log: &mut dyn RunLog,
    ) -> Option<Vec<(PathBuf, bool)>> {
        let resolved = match resolve_pattern(pattern, self.paths) {
            Ok(resolved) => resolved,
            Err(err) => {
                log.warn("pattern.invalid", &err.to_string());
                return None;
            }
        };
        for (path, message) in resolved.errors {
            report.record_skipped(&path, SkipReason::Enumeration(message), log);
        }
        report.matched_roots = resolved.roots.len();
        if resolved.roots.is_empty() {
            log.verbose("pattern.empty", &format!("Nothing matches {pattern}"));
            return None;
        }
        let wildcard = resolved.wildcard;
        Some(
            resolved
                .roots
                .into_iter()
                .map(|root| {
                    let literal_dir = !wildcard && is_real_dir(&root);
                    (root, !literal_dir)
                })
                .collect(),
        )
    }

    fn enumerate(
        &self,
        root: &Path,
        include_root: bool,
        report: &mut RemovalReport,
        log: &mut dyn RunLog,
    ) -> Vec<Candidate> {
        let min_depth = usize::from(!include_root);
        let mut candidates = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .follow_root_links(false)
            .min_depth(min_depth);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err.path().unwrap_or(root).to_path_buf();
                    report.record_skipped(&path, SkipReason::Enumeration(err.to_string()), log);
                    continue;
                }
            };
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(err) => {
                    report.record_skipped(
                        entry.path(),
                        SkipReason::Enumeration(err.to_string()),
                        log,
                    );
                    continue;
                }
            };
            let file_type = entry.file_type();
            candidates.push(Candidate {
                path: entry.into_path(),
                is_dir: file_type.is_dir(),
                timestamp: self.basis.timestamp(&meta),
                // Links free no more than their own inode.
                size: if file_type.is_file() { meta.len() } else { 0 },
            });
        }
        candidates
    }

    fn remove_tree(&self, path: &Path, report: &mut RemovalReport, log: &mut dyn RunLog) {
        let is_dir = is_real_dir(path);
        let before = entry_size(path);
        let result = if is_dir {
            self.ops.remove_dir_all(path)
        } else {
            self.remove_leaf(path)
        };
        match result {
            Ok(()) => report.record_removed(path, before, log),
            Err(err) => {
                // A partially removed tree still freed something.
                let after = if path.symlink_metadata().is_ok() {
                    entry_size(path)
                } else {
                    0
                };
                report.bytes_freed += before.saturating_sub(after);
                report.record_skipped(path, SkipReason::from_io(&err), log);
            }
        }
    }

    /// Remove a file or a link. A link is never resolved; on Windows a
    /// directory symlink or junction is removed as a directory.
    fn remove_leaf(&self, path: &Path) -> io::Result<()> {
        if cfg!(windows) && is_link_to_dir(path) {
            self.ops.remove_dir(path)
        } else {
            self.ops.remove_file(path)
        }
    }
}

fn is_link_to_dir(path: &Path) -> bool {
    path.symlink_metadata()
        .is_ok_and(|meta| !meta.is_dir() && !meta.is_file())
        && path.metadata().is_ok_and(|meta| meta.is_dir())
}

/// Directory that is not a symlink.
fn is_real_dir(path: &Path) -> bool {
    path.symlink_metadata().is_ok_and(|meta| meta.is_dir())
}

/// Apparent size of a file or directory tree, without following symlinks.
#[must_use]
pub fn entry_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .follow_root_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum()
}
