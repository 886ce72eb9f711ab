//! One reclamation run, end to end.
//!
//! The run resolves tier and privilege, opens the session log, snapshots the
//! fixed volumes, pauses the update agent around service-sensitive tasks,
//! walks the task matrix in tier order, optionally scans for large files and
//! finishes with an after snapshot and a diff. Only start-up problems (an
//! unwritable log directory) and the operator declining end a run early;
//! everything after the first snapshot degrades to warnings.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::cli::prompt::{PromptKey, Prompter, choose_tier, confirm};
use crate::cli::report::{format_bytes, format_signed_bytes};
use crate::core::config::{Config, LargeFileConfig};
use crate::core::errors::Result;
use crate::core::paths::PathContext;
use crate::core::tier::{CleanupTier, PrivilegeLevel};
use crate::logger::session::{ConsoleEcho, LogFormat, RunLog, SessionRecorder};
use crate::monitor::snapshot::{DiskUsageSnapshot, SnapshotDiff};
use crate::platform::pal::{Platform, ServiceActionResult};
use crate::platform::process::ExternalTools;
use crate::platform::service::ServiceCoordinator;
use crate::reclaim::large_files::{LargeFileReport, scan_large_files};
use crate::reclaim::matrix::{CleanupTask, Disposition, TaskAction, TaskMatrix};
use crate::reclaim::removal::{AgeBasis, EntryOps, RemovalReport, Remover};

/// Caller-supplied answers and settings for one run. `None` means "ask".
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub tier: Option<CleanupTier>,
    pub age_days: u32,
    pub age_basis: AgeBasis,
    /// Answers the continue-without-elevation prompt with yes.
    pub allow_unelevated: bool,
    /// Only consulted at the Light tier.
    pub include_service_tasks: Option<bool>,
    pub scan_large_files: Option<bool>,
    pub large_file_root: Option<PathBuf>,
    pub large_files: LargeFileConfig,
    pub service_name: String,
    pub log_dir: PathBuf,
    pub log_stem: String,
    pub log_format: LogFormat,
    pub echo: ConsoleEcho,
}

impl RunOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            tier: None,
            age_days: config.run.age_days,
            age_basis: config.run.age_basis,
            allow_unelevated: false,
            include_service_tasks: None,
            scan_large_files: None,
            large_file_root: config.large_files.root.clone(),
            large_files: config.large_files.clone(),
            service_name: config.service.name.clone(),
            log_dir: config.logging.resolved_dir(),
            log_stem: config.logging.stem.clone(),
            log_format: config.logging.format,
            echo: ConsoleEcho::default(),
        }
    }
}

/// State owned by a single `run` call.
pub struct RunContext {
    pub tier: CleanupTier,
    pub privilege: PrivilegeLevel,
    /// Set only when this run actually stopped the service.
    pub service_stopped: bool,
    pub started_at: DateTime<Local>,
    pub started: Instant,
    pub host_name: String,
    pub log: SessionRecorder,
}

/// What happened to one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum TaskResult {
    Removal(RemovalReport),
    Completed {
        program: String,
        exit_code: i32,
    },
    /// Ran but reported failure.
    ExitedWithError {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    /// The tool reported that what it manages does not exist here.
    NotPresent {
        program: String,
        exit_code: i32,
    },
    ToolMissing {
        program: String,
    },
    LaunchFailed {
        program: String,
        details: String,
    },
}

/// Carries out a single eligible task.
pub trait TaskExecutor {
    /// `run_age_days` applies to age-filtered tasks without their own
    /// threshold.
    fn execute(&self, task: &CleanupTask, run_age_days: u32, log: &mut dyn RunLog) -> TaskResult;
}

/// Removal primitive plus cached external tools.
pub struct DefaultExecutor<'a> {
    remover: Remover<'a>,
    tools: ExternalTools<'a>,
}

impl<'a> DefaultExecutor<'a> {
    #[must_use]
    pub fn new(remover: Remover<'a>, tools: ExternalTools<'a>) -> Self {
        Self { remover, tools }
    }

    fn run_external(
        &self,
        program: &str,
        args: &[String],
        absent_exit_codes: &[i32],
        log: &mut dyn RunLog,
    ) -> TaskResult {
        let Some(path) = self.tools.locate(program) else {
            log.warn("tool.missing", &format!("{program} is not available; skipping"));
            return TaskResult::ToolMissing {
                program: program.to_string(),
            };
        };
        log.verbose("tool.run", &format!("Running {} {}", path.display(), args.join(" ")));
        let exit = match self.tools.run(&path, args) {
            Ok(exit) => exit,
            Err(err) => {
                log.error("tool.failed", &err.to_string());
                return TaskResult::LaunchFailed {
                    program: program.to_string(),
                    details: err.to_string(),
                };
            }
        };
        match exit.code {
            Some(0) => TaskResult::Completed {
                program: program.to_string(),
                exit_code: 0,
            },
            Some(code) if absent_exit_codes.contains(&code) => {
                log.warn(
                    "tool.not-present",
                    &format!("{program} reports nothing to manage on this machine"),
                );
                TaskResult::NotPresent {
                    program: program.to_string(),
                    exit_code: code,
                }
            }
            code => {
                let stderr = exit.stderr.trim().to_string();
                log.warn(
                    "tool.failed",
                    &format!(
                        "{program} exited with {}{}",
                        code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")),
                        if stderr.is_empty() {
                            String::new()
                        } else {
                            format!(": {stderr}")
                        }
                    ),
                );
                TaskResult::ExitedWithError {
                    program: program.to_string(),
                    exit_code: code,
                    stderr,
                }
            }
        }
    }
}

impl TaskExecutor for DefaultExecutor<'_> {
    fn execute(&self, task: &CleanupTask, run_age_days: u32, log: &mut dyn RunLog) -> TaskResult {
        match &task.action {
            TaskAction::AgeFiltered { pattern, age_days } => TaskResult::Removal(
                self.remover
                    .remove_older_than(pattern, age_days.unwrap_or(run_age_days), log),
            ),
            TaskAction::Unconditional { pattern } => {
                TaskResult::Removal(self.remover.remove_all(pattern, log))
            }
            TaskAction::External {
                program,
                args,
                absent_exit_codes,
            } => self.run_external(program, args, absent_exit_codes, log),
        }
    }
}

/// One matrix row and what the run did with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOutcome {
    pub id: String,
    pub description: String,
    pub min_tier: CleanupTier,
    pub disposition: Disposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub tasks_run: usize,
    pub entries_removed: usize,
    pub entries_skipped: usize,
    pub bytes_freed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSummary {
    pub name: String,
    pub included: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<ServiceActionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<ServiceActionResult>,
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub host_name: String,
    pub tier: CleanupTier,
    pub privilege: PrivilegeLevel,
    pub started_at: DateTime<Local>,
    pub elapsed_secs: f64,
    pub service: ServiceSummary,
    pub tasks: Vec<TaskOutcome>,
    pub totals: RunTotals,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_files: Option<LargeFileReport>,
    pub before: DiskUsageSnapshot,
    pub after: DiskUsageSnapshot,
    pub diff: SnapshotDiff,
    pub log_path: PathBuf,
}

impl RunReport {
    /// Ids of the tasks that were handed to the executor, in order.
    #[must_use]
    pub fn executed_ids(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| t.result.is_some())
            .map(|t| t.id.as_str())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(Box<RunReport>),
    /// The operator declined to continue without elevation.
    Declined,
}

/// Drives one run against a platform and an immutable task matrix.
pub struct Orchestrator<'a> {
    platform: &'a dyn Platform,
    matrix: &'a TaskMatrix,
    paths: &'a PathContext,
    options: RunOptions,
    executor: Option<&'a dyn TaskExecutor>,
    entry_ops: Option<&'a dyn EntryOps>,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(
        platform: &'a dyn Platform,
        matrix: &'a TaskMatrix,
        paths: &'a PathContext,
        options: RunOptions,
    ) -> Self {
        Self {
            platform,
            matrix,
            paths,
            options,
            executor: None,
            entry_ops: None,
        }
    }

    /// Replace the default executor.
    #[must_use]
    pub fn with_executor(mut self, executor: &'a dyn TaskExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Deletion backend for the default executor.
    #[must_use]
    pub fn with_entry_ops(mut self, ops: &'a dyn EntryOps) -> Self {
        self.entry_ops = Some(ops);
        self
    }

    pub fn run(&self, prompter: &mut dyn Prompter) -> Result<RunOutcome> {
        let options = &self.options;
        let tier = options.tier.unwrap_or_else(|| choose_tier(prompter));
        let privilege = self.platform.privilege_level();
        let started_at = Local::now();
        let log = SessionRecorder::open(
            &options.log_dir,
            &options.log_stem,
            started_at,
            options.log_format,
            options.echo,
        )?;
        let mut ctx = RunContext {
            tier,
            privilege,
            service_stopped: false,
            started_at,
            started: Instant::now(),
            host_name: self.platform.host_name(),
            log,
        };
        ctx.log.info(
            "run.start",
            &format!(
                "Reclaiming disk space on {} (tier {tier}, privilege {privilege})",
                ctx.host_name
            ),
        );

        if !privilege.is_elevated() {
            ctx.log.warn(
                "privilege",
                "Not running elevated: only user-scope tasks are eligible",
            );
            let proceed = options.allow_unelevated
                || confirm(
                    prompter,
                    PromptKey::ContinueWithoutElevation,
                    "Continue with user-scope cleanup only?",
                    false,
                );
            if !proceed {
                ctx.log.verbose("run.declined", "Operator declined to continue");
                return Ok(RunOutcome::Declined);
            }
        }

        let before = self.snapshot("before", &mut ctx.log);

        let include_service_tasks = self.resolve_service_tasks(tier, privilege, prompter);
        let coordinator =
            ServiceCoordinator::new(self.platform.service_manager(), &options.service_name);
        let mut service = ServiceSummary {
            name: coordinator.name().to_string(),
            included: include_service_tasks,
            stop: None,
            start: None,
        };
        if include_service_tasks && privilege.is_elevated() {
            let result = coordinator.stop(&mut ctx.log);
            ctx.service_stopped = result == ServiceActionResult::Done;
            service.stop = Some(result);
        }

        let (tasks, totals) = self.walk(&mut ctx, include_service_tasks);

        if ctx.service_stopped {
            service.start = Some(coordinator.start(&mut ctx.log));
        }

        let scan = options.scan_large_files.unwrap_or_else(|| {
            confirm(
                prompter,
                PromptKey::ScanLargeFiles,
                "Scan for large disk images and update packages?",
                false,
            )
        });
        let large_files = scan.then(|| self.scan_large(&mut ctx.log));

        let after = self.snapshot("after", &mut ctx.log);
        let diff = SnapshotDiff::between(&before, &after);
        let elapsed_secs = ctx.started.elapsed().as_secs_f64();
        ctx.log.info(
            "run.finish",
            &format!(
                "Ran {} task(s); removed {} entries ({}); volumes gained {} in {elapsed_secs:.1}s",
                totals.tasks_run,
                totals.entries_removed,
                format_bytes(totals.bytes_freed),
                format_signed_bytes(diff.total_freed_bytes),
            ),
        );

        let log_path = ctx.log.close();
        Ok(RunOutcome::Completed(Box::new(RunReport {
            host_name: ctx.host_name,
            tier,
            privilege,
            started_at,
            elapsed_secs,
            service,
            tasks,
            totals,
            large_files,
            before,
            after,
            diff,
            log_path,
        })))
    }

    fn resolve_service_tasks(
        &self,
        tier: CleanupTier,
        privilege: PrivilegeLevel,
        prompter: &mut dyn Prompter,
    ) -> bool {
        if !self.matrix.has_service_sensitive(tier, privilege) {
            return false;
        }
        if tier > CleanupTier::Light {
            return true;
        }
        self.options.include_service_tasks.unwrap_or_else(|| {
            confirm(
                prompter,
                PromptKey::IncludeUpdateCache,
                "Also clear the update download cache? The update service is paused meanwhile.",
                false,
            )
        })
    }

    fn walk(&self, ctx: &mut RunContext, include_service_tasks: bool) -> (Vec<TaskOutcome>, RunTotals) {
        let remover = {
            let remover = Remover::new(self.paths, self.options.age_basis);
            match self.entry_ops {
                Some(ops) => remover.with_ops(ops),
                None => remover,
            }
        };
        let default_executor = DefaultExecutor::new(
            remover,
            ExternalTools::new(self.platform.process_runner()),
        );
        let executor: &dyn TaskExecutor = match self.executor {
            Some(executor) => executor,
            None => &default_executor,
        };

        let mut outcomes = Vec::new();
        let mut totals = RunTotals::default();
        for planned in self.matrix.plan(ctx.tier, ctx.privilege, include_service_tasks) {
            let task = planned.task;
            let result = match planned.disposition {
                Disposition::Run => {
                    ctx.log.info("task.start", &format!("[{}] {}", task.id, task.description));
                    let result = executor.execute(task, self.options.age_days, &mut ctx.log);
                    totals.tasks_run += 1;
                    if let TaskResult::Removal(report) = &result {
                        totals.entries_removed += report.removed.len();
                        totals.entries_skipped += report.skipped.len();
                        totals.bytes_freed += report.bytes_freed;
                        ctx.log.info(
                            "task.done",
                            &format!(
                                "[{}] removed {} entries ({}), skipped {}",
                                task.id,
                                report.removed.len(),
                                format_bytes(report.bytes_freed),
                                report.skipped.len()
                            ),
                        );
                    }
                    Some(result)
                }
                Disposition::NeedsElevation => {
                    ctx.log.info(
                        "task.needs-elevation",
                        &format!("[{}] {} requires elevation; skipped", task.id, task.description),
                    );
                    None
                }
                Disposition::OptedOut => {
                    ctx.log.info(
                        "task.opted-out",
                        &format!("[{}] {} left out by operator", task.id, task.description),
                    );
                    None
                }
                Disposition::AboveTier => None,
            };
            outcomes.push(TaskOutcome {
                id: task.id.clone(),
                description: task.description.clone(),
                min_tier: task.min_tier,
                disposition: planned.disposition,
                result,
            });
        }
        (outcomes, totals)
    }

    fn snapshot(&self, label: &str, log: &mut dyn RunLog) -> DiskUsageSnapshot {
        match DiskUsageSnapshot::capture(self.platform) {
            Ok(snapshot) => {
                for volume in &snapshot.volumes {
                    log.info(
                        "snapshot",
                        &format!(
                            "{label}: {} free {} of {} ({:.1}%)",
                            volume.id,
                            format_bytes(volume.free_bytes),
                            format_bytes(volume.total_bytes),
                            volume.free_pct()
                        ),
                    );
                }
                snapshot
            }
            Err(err) => {
                log.warn("snapshot", &format!("{label} snapshot unavailable: {err}"));
                DiskUsageSnapshot::empty()
            }
        }
    }

    fn scan_large(&self, log: &mut dyn RunLog) -> LargeFileReport {
        let root = self
            .options
            .large_file_root
            .clone()
            .unwrap_or_else(|| self.paths.root.clone());
        log.info("large-files", &format!("Scanning {} for large files", root.display()));
        let report = scan_large_files(&root, &self.options.large_files);
        for file in &report.files {
            log.info(
                "large-files",
                &format!("{} {}", format_bytes(file.bytes), file.path.display()),
            );
        }
        if report.files.is_empty() {
            log.info("large-files", "No matching files found");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::prompt::ScriptedPrompter;
    use crate::core::errors::RclError;
    use crate::logger::session::{LogLevel, MemoryLog};
    use crate::platform::pal::{ProcessExit, ProcessRunner, ServiceManager, VolumeUsage};
    use std::path::Path;

    struct StubRunner;

    impl ProcessRunner for StubRunner {
        fn locate(&self, program: &str) -> Option<PathBuf> {
            (program != "missing-tool").then(|| PathBuf::from("/bin").join(program))
        }

        fn run(&self, program: &Path, _args: &[String]) -> Result<ProcessExit> {
            let code = match program.file_name().and_then(|n| n.to_str()) {
                Some("unlaunchable-tool") => {
                    return Err(RclError::Process {
                        program: "unlaunchable-tool".to_string(),
                        details: "exec format error".to_string(),
                    });
                }
                Some("absent-tool") => 3,
                Some("broken-tool") => 1,
                _ => 0,
            };
            Ok(ProcessExit {
                code: Some(code),
                stdout: String::new(),
                stderr: if code == 1 { "boom".to_string() } else { String::new() },
            })
        }
    }

    fn external(program: &str) -> CleanupTask {
        CleanupTask::external(program, program, CleanupTier::Light, program, &[])
            .with_absent_exit_codes(&[3])
    }

    #[test]
    fn external_results_are_classified() {
        let ctx = PathContext::rooted_at(Path::new("/nonexistent-root"));
        let executor = DefaultExecutor::new(
            Remover::new(&ctx, AgeBasis::Modified),
            ExternalTools::new(&StubRunner),
        );
        let mut log = MemoryLog::default();
        assert!(matches!(
            executor.execute(&external("cleanmgr.exe"), 30, &mut log),
            TaskResult::Completed { exit_code: 0, .. }
        ));
        assert!(matches!(
            executor.execute(&external("absent-tool"), 30, &mut log),
            TaskResult::NotPresent { exit_code: 3, .. }
        ));
        assert!(matches!(
            executor.execute(&external("broken-tool"), 30, &mut log),
            TaskResult::ExitedWithError { exit_code: Some(1), .. }
        ));
        assert!(matches!(
            executor.execute(&external("missing-tool"), 30, &mut log),
            TaskResult::ToolMissing { .. }
        ));
        assert_eq!(log.events("tool.missing").count(), 1);
        assert_eq!(log.events("tool.not-present").count(), 1);
    }

    #[test]
    fn launch_failure_is_logged_as_an_error() {
        let ctx = PathContext::rooted_at(Path::new("/nonexistent-root"));
        let executor = DefaultExecutor::new(
            Remover::new(&ctx, AgeBasis::Modified),
            ExternalTools::new(&StubRunner),
        );
        let mut log = MemoryLog::default();
        let result = executor.execute(&external("unlaunchable-tool"), 30, &mut log);

        assert!(matches!(result, TaskResult::LaunchFailed { .. }));
        let record = log.events("tool.failed").next().unwrap();
        assert_eq!(record.level, LogLevel::Error);
        assert!(record.message.contains("exec format error"));
    }

    struct FailingPlatform;

    struct NoService;

    impl ServiceManager for NoService {
        fn stop(&self, _name: &str) -> ServiceActionResult {
            ServiceActionResult::NotInstalled
        }

        fn start(&self, _name: &str) -> ServiceActionResult {
            ServiceActionResult::NotInstalled
        }
    }

    impl Platform for FailingPlatform {
        fn privilege_level(&self) -> PrivilegeLevel {
            PrivilegeLevel::Elevated
        }

        fn fixed_volumes(&self) -> Result<Vec<VolumeUsage>> {
            Err(crate::core::errors::RclError::Snapshot {
                details: "no volumes".to_string(),
            })
        }

        fn host_name(&self) -> String {
            "test-host".to_string()
        }

        fn service_manager(&self) -> &dyn ServiceManager {
            &NoService
        }

        fn process_runner(&self) -> &dyn ProcessRunner {
            &StubRunner
        }
    }

    #[test]
    fn snapshot_failure_and_missing_service_do_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathContext::rooted_at(dir.path());
        let matrix = TaskMatrix::new(vec![
            CleanupTask::unconditional("cache", "Cache", CleanupTier::Light, "{root}/cache/*")
                .elevated()
                .pausing_service(),
        ])
        .unwrap();
        let mut options = RunOptions::from_config(&Config::default());
        options.tier = Some(CleanupTier::Standard);
        options.scan_large_files = Some(false);
        options.log_dir = dir.path().join("logs");
        options.echo = ConsoleEcho::Off;

        let orchestrator = Orchestrator::new(&FailingPlatform, &matrix, &paths, options);
        let RunOutcome::Completed(report) = orchestrator.run(&mut ScriptedPrompter::new()).unwrap()
        else {
            panic!("run should complete");
        };
        assert!(report.before.volumes.is_empty());
        assert_eq!(report.service.stop, Some(ServiceActionResult::NotInstalled));
        assert_eq!(report.service.start, None);
        assert_eq!(report.executed_ids(), ["cache"]);
        assert!(report.log_path.exists());
    }
}
