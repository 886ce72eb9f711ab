//! End-to-end runs of the orchestrator against a mocked platform and a
//! sandboxed filesystem.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Local;
use filetime::{FileTime, set_file_mtime};
use serde_json::Value;

use disk_reclaim::cli::prompt::{PromptKey, ScriptedPrompter};
use disk_reclaim::cli::report::format_run_report;
use disk_reclaim::core::config::Config;
use disk_reclaim::core::errors::Result;
use disk_reclaim::core::paths::PathContext;
use disk_reclaim::core::tier::{CleanupTier, PrivilegeLevel};
use disk_reclaim::logger::session::{ConsoleEcho, LogFormat, RunLog};
use disk_reclaim::platform::pal::{
    Platform, ProcessExit, ProcessRunner, ServiceActionResult, ServiceManager, VolumeUsage,
};
use disk_reclaim::reclaim::defaults::unix_matrix;
use disk_reclaim::reclaim::matrix::{CleanupTask, TaskMatrix};
use disk_reclaim::reclaim::orchestrator::{
    Orchestrator, RunOptions, RunOutcome, RunReport, TaskExecutor, TaskResult,
};
use disk_reclaim::reclaim::removal::{AgeBasis, RemovalReport, entry_size};

const CAPACITY: u64 = 1 << 30;

struct MockServices {
    stop_result: ServiceActionResult,
    calls: RefCell<Vec<&'static str>>,
}

impl ServiceManager for MockServices {
    fn stop(&self, _name: &str) -> ServiceActionResult {
        self.calls.borrow_mut().push("stop");
        self.stop_result.clone()
    }

    fn start(&self, _name: &str) -> ServiceActionResult {
        self.calls.borrow_mut().push("start");
        ServiceActionResult::Done
    }
}

/// No external tools are installed.
struct NoTools;

impl ProcessRunner for NoTools {
    fn locate(&self, _program: &str) -> Option<PathBuf> {
        None
    }

    fn run(&self, program: &Path, _args: &[String]) -> Result<ProcessExit> {
        panic!("unexpected run of {}", program.display());
    }
}

struct MockPlatform {
    privilege: PrivilegeLevel,
    services: MockServices,
    /// Free space shrinks with the size of this tree.
    volume_root: PathBuf,
}

impl MockPlatform {
    fn new(privilege: PrivilegeLevel, stop_result: ServiceActionResult, volume_root: &Path) -> Self {
        Self {
            privilege,
            services: MockServices {
                stop_result,
                calls: RefCell::new(Vec::new()),
            },
            volume_root: volume_root.to_path_buf(),
        }
    }

    fn service_calls(&self) -> Vec<&'static str> {
        self.services.calls.borrow().clone()
    }
}

impl Platform for MockPlatform {
    fn privilege_level(&self) -> PrivilegeLevel {
        self.privilege
    }

    fn fixed_volumes(&self) -> Result<Vec<VolumeUsage>> {
        Ok(vec![VolumeUsage {
            id: "sandbox".to_string(),
            mount_point: self.volume_root.clone(),
            file_system: "mockfs".to_string(),
            total_bytes: CAPACITY,
            free_bytes: CAPACITY - entry_size(&self.volume_root),
        }])
    }

    fn host_name(&self) -> String {
        "scenario-host".to_string()
    }

    fn service_manager(&self) -> &dyn ServiceManager {
        &self.services
    }

    fn process_runner(&self) -> &dyn ProcessRunner {
        &NoTools
    }
}

/// Records task ids instead of touching the filesystem.
#[derive(Default)]
struct RecordingExecutor {
    executed: RefCell<Vec<String>>,
}

impl TaskExecutor for RecordingExecutor {
    fn execute(&self, task: &CleanupTask, _run_age_days: u32, _log: &mut dyn RunLog) -> TaskResult {
        self.executed.borrow_mut().push(task.id.clone());
        TaskResult::Removal(RemovalReport::default())
    }
}

struct Sandbox {
    _dir: tempfile::TempDir,
    root: PathBuf,
    logs: PathBuf,
    paths: PathContext,
}

fn sandbox() -> Sandbox {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root");
    let logs = dir.path().join("logs");
    fs::create_dir_all(&root).unwrap();
    let paths = PathContext::rooted_at(&root);
    Sandbox {
        _dir: dir,
        root,
        logs,
        paths,
    }
}

fn aged_file(path: &Path, days: u64) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"log line\n").unwrap();
    let when = SystemTime::now() - Duration::from_secs(days * 86_400);
    set_file_mtime(path, FileTime::from_system_time(when)).unwrap();
}

fn options(sandbox: &Sandbox, tier: Option<CleanupTier>) -> RunOptions {
    let mut options = RunOptions::from_config(&Config::default());
    options.tier = tier;
    options.age_days = 30;
    options.age_basis = AgeBasis::Modified;
    options.allow_unelevated = true;
    options.log_dir = sandbox.logs.clone();
    options.log_format = LogFormat::Jsonl;
    options.echo = ConsoleEcho::Off;
    options
}

fn completed(outcome: RunOutcome) -> RunReport {
    match outcome {
        RunOutcome::Completed(report) => *report,
        RunOutcome::Declined => panic!("run was declined"),
    }
}

fn log_records(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn executed_with(
    matrix: &TaskMatrix,
    tier: CleanupTier,
    privilege: PrivilegeLevel,
    opt_in: bool,
) -> Vec<String> {
    let sandbox = sandbox();
    let platform = MockPlatform::new(privilege, ServiceActionResult::Done, &sandbox.root);
    let executor = RecordingExecutor::default();
    let mut opts = options(&sandbox, Some(tier));
    opts.include_service_tasks = Some(opt_in);
    let outcome = Orchestrator::new(&platform, matrix, &sandbox.paths, opts)
        .with_executor(&executor)
        .run(&mut ScriptedPrompter::new())
        .unwrap();
    completed(outcome);
    executor.executed.into_inner()
}

#[test]
fn scenario_a_light_unelevated_removes_only_the_old_temp_file() {
    let sandbox = sandbox();
    let old = sandbox.paths.temp.join("old.tmp");
    let young = sandbox.paths.temp.join("young.tmp");
    aged_file(&old, 40);
    aged_file(&young, 5);

    let platform = MockPlatform::new(
        PrivilegeLevel::Standard,
        ServiceActionResult::Done,
        &sandbox.root,
    );
    let matrix = unix_matrix();
    let report = completed(
        Orchestrator::new(
            &platform,
            &matrix,
            &sandbox.paths,
            options(&sandbox, Some(CleanupTier::Light)),
        )
        .run(&mut ScriptedPrompter::new())
        .unwrap(),
    );

    assert!(!old.exists());
    assert!(young.exists());
    assert_eq!(report.totals.entries_removed, 1);
    assert!(platform.service_calls().is_empty());

    let removals: Vec<Value> = log_records(&report.log_path)
        .into_iter()
        .filter(|record| record["event"] == "removed")
        .collect();
    assert_eq!(removals.len(), 1);
    assert_eq!(removals[0]["path"], old.to_str().unwrap());
}

#[test]
fn scenario_b_deep_elevated_keeps_recent_web_server_logs() {
    let sandbox = sandbox();
    let nginx = sandbox.root.join("var/log/nginx");
    aged_file(&nginx.join("access.log"), 61);
    aged_file(&nginx.join("error.log"), 10);

    let platform = MockPlatform::new(
        PrivilegeLevel::Elevated,
        ServiceActionResult::Done,
        &sandbox.root,
    );
    let matrix = unix_matrix();
    let report = completed(
        Orchestrator::new(
            &platform,
            &matrix,
            &sandbox.paths,
            options(&sandbox, Some(CleanupTier::Deep)),
        )
        .run(&mut ScriptedPrompter::new())
        .unwrap(),
    );

    assert!(!nginx.join("access.log").exists());
    assert!(nginx.join("error.log").exists());
    assert_eq!(report.totals.entries_removed, 1);
    assert_eq!(platform.service_calls(), ["stop", "start"]);
    let journal = report
        .tasks
        .iter()
        .find(|t| t.id == "journal-vacuum")
        .unwrap();
    assert!(matches!(journal.result, Some(TaskResult::ToolMissing { .. })));
}

#[test]
fn scenario_c_missing_service_skips_the_restart() {
    let sandbox = sandbox();
    let platform = MockPlatform::new(
        PrivilegeLevel::Elevated,
        ServiceActionResult::NotInstalled,
        &sandbox.root,
    );
    let matrix = unix_matrix();
    let report = completed(
        Orchestrator::new(
            &platform,
            &matrix,
            &sandbox.paths,
            options(&sandbox, Some(CleanupTier::Standard)),
        )
        .run(&mut ScriptedPrompter::new())
        .unwrap(),
    );

    assert_eq!(platform.service_calls(), ["stop"]);
    assert_eq!(report.service.stop, Some(ServiceActionResult::NotInstalled));
    assert_eq!(report.service.start, None);
    let warned = log_records(&report.log_path).into_iter().any(|record| {
        record["event"] == "service.stop"
            && record["level"] == "warn"
            && record["message"]
                .as_str()
                .is_some_and(|m| m.contains("not installed"))
    });
    assert!(warned);
    let summary = format_run_report(&report);
    assert!(summary.contains("Disk usage:"));
}

#[test]
fn executed_sets_grow_with_tier() {
    let matrix = unix_matrix();
    for privilege in [PrivilegeLevel::Standard, PrivilegeLevel::Elevated] {
        for opt_in in [false, true] {
            let light = executed_with(&matrix, CleanupTier::Light, privilege, opt_in);
            let standard = executed_with(&matrix, CleanupTier::Standard, privilege, opt_in);
            let deep = executed_with(&matrix, CleanupTier::Deep, privilege, opt_in);
            assert!(light.iter().all(|id| standard.contains(id)), "{privilege}");
            assert!(standard.iter().all(|id| deep.contains(id)), "{privilege}");
        }
    }
}

#[test]
fn standard_privilege_never_runs_elevated_tasks() {
    let matrix = unix_matrix();
    for tier in CleanupTier::ALL {
        let executed = executed_with(&matrix, tier, PrivilegeLevel::Standard, true);
        assert!(!executed.is_empty());
        for id in executed {
            let task = matrix.tasks().iter().find(|t| t.id == id).unwrap();
            assert!(!task.requires_elevation, "{id} ran at {tier} without elevation");
        }
    }
}

#[test]
fn service_stop_and_start_are_paired_in_every_combination() {
    let matrix = unix_matrix();
    for tier in CleanupTier::ALL {
        for privilege in [PrivilegeLevel::Standard, PrivilegeLevel::Elevated] {
            for opt_in in [false, true] {
                let sandbox = sandbox();
                let platform = MockPlatform::new(privilege, ServiceActionResult::Done, &sandbox.root);
                let executor = RecordingExecutor::default();
                let mut prompter = ScriptedPrompter::new()
                    .answer_yes_no(PromptKey::IncludeUpdateCache, opt_in);
                let mut opts = options(&sandbox, Some(tier));
                opts.include_service_tasks = None;
                completed(
                    Orchestrator::new(&platform, &matrix, &sandbox.paths, opts)
                        .with_executor(&executor)
                        .run(&mut prompter)
                        .unwrap(),
                );

                let should_stop =
                    privilege.is_elevated() && (tier > CleanupTier::Light || opt_in);
                let expected: &[&str] = if should_stop { &["stop", "start"] } else { &[] };
                assert_eq!(
                    platform.service_calls(),
                    expected,
                    "tier {tier}, privilege {privilege}, opt-in {opt_in}"
                );
                let asked_opt_in = prompter.asked().contains(&PromptKey::IncludeUpdateCache);
                assert_eq!(
                    asked_opt_in,
                    tier == CleanupTier::Light && privilege.is_elevated()
                );
            }
        }
    }
}

#[test]
fn restart_follows_only_an_actual_stop() {
    let matrix = unix_matrix();
    for stop_result in [
        ServiceActionResult::AlreadyInState,
        ServiceActionResult::NotInstalled,
        ServiceActionResult::Failed("access denied".to_string()),
    ] {
        let sandbox = sandbox();
        let platform = MockPlatform::new(PrivilegeLevel::Elevated, stop_result, &sandbox.root);
        let executor = RecordingExecutor::default();
        completed(
            Orchestrator::new(
                &platform,
                &matrix,
                &sandbox.paths,
                options(&sandbox, Some(CleanupTier::Deep)),
            )
            .with_executor(&executor)
            .run(&mut ScriptedPrompter::new())
            .unwrap(),
        );
        assert_eq!(platform.service_calls(), ["stop"]);
    }
}

#[test]
fn declining_unelevated_run_closes_the_log_and_touches_nothing() {
    let sandbox = sandbox();
    let platform = MockPlatform::new(
        PrivilegeLevel::Standard,
        ServiceActionResult::Done,
        &sandbox.root,
    );
    let matrix = unix_matrix();
    let executor = RecordingExecutor::default();
    let mut opts = options(&sandbox, None);
    opts.allow_unelevated = false;
    let mut prompter = ScriptedPrompter::new().answer(PromptKey::Tier, 2);

    let outcome = Orchestrator::new(&platform, &matrix, &sandbox.paths, opts)
        .with_executor(&executor)
        .run(&mut prompter)
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Declined));
    assert!(executor.executed.borrow().is_empty());
    assert_eq!(
        prompter.asked(),
        [PromptKey::Tier, PromptKey::ContinueWithoutElevation]
    );
    let log = fs::read_dir(&sandbox.logs)
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let events: Vec<String> = log_records(&log)
        .into_iter()
        .map(|record| record["event"].as_str().unwrap().to_string())
        .collect();
    assert!(events.contains(&"run.declined".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("session.close"));
}

#[test]
fn second_run_finds_nothing_more_to_reclaim() {
    let sandbox = sandbox();
    aged_file(&sandbox.paths.temp.join("a/old.tmp"), 90);
    aged_file(&sandbox.paths.temp.join("b.tmp"), 45);
    aged_file(&sandbox.paths.temp.join("fresh.tmp"), 2);

    let platform = MockPlatform::new(
        PrivilegeLevel::Elevated,
        ServiceActionResult::Done,
        &sandbox.root,
    );
    let matrix = unix_matrix();
    let run = || {
        completed(
            Orchestrator::new(
                &platform,
                &matrix,
                &sandbox.paths,
                options(&sandbox, Some(CleanupTier::Standard)),
            )
            .run(&mut ScriptedPrompter::new())
            .unwrap(),
        )
    };
    let first = run();
    // Log files land outside the measured tree.
    let second = run();

    assert!(first.diff.total_freed_bytes > 0);
    assert_eq!(first.after.volumes, second.after.volumes);
    assert_eq!(second.diff.total_freed_bytes, 0);
    assert_eq!(second.totals.entries_removed, 0);
    assert!(sandbox.paths.temp.join("fresh.tmp").exists());
}

#[test]
fn large_file_scan_is_report_only() {
    let sandbox = sandbox();
    let iso = sandbox.root.join("images/install.iso");
    fs::create_dir_all(iso.parent().unwrap()).unwrap();
    fs::write(&iso, vec![0_u8; 4096]).unwrap();

    let platform = MockPlatform::new(
        PrivilegeLevel::Standard,
        ServiceActionResult::Done,
        &sandbox.root,
    );
    let matrix = unix_matrix();
    let mut prompter = ScriptedPrompter::new().answer_yes_no(PromptKey::ScanLargeFiles, true);
    let report = completed(
        Orchestrator::new(
            &platform,
            &matrix,
            &sandbox.paths,
            options(&sandbox, Some(CleanupTier::Light)),
        )
        .run(&mut prompter)
        .unwrap(),
    );

    let large = report.large_files.unwrap();
    assert_eq!(large.files.len(), 1);
    assert_eq!(large.files[0].path, iso);
    assert!(iso.exists());
    assert!(report.started_at <= Local::now());
}
