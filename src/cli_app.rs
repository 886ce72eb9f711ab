//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::control;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use disk_reclaim::cli::prompt::{ConsolePrompter, ScriptedPrompter};
use disk_reclaim::cli::report::{
    format_large_files, format_plan, format_run_report, format_snapshot,
};
use disk_reclaim::core::config::Config;
use disk_reclaim::core::errors::RclError;
use disk_reclaim::core::paths::PathContext;
use disk_reclaim::core::tier::{CleanupTier, PrivilegeLevel};
use disk_reclaim::logger::session::ConsoleEcho;
use disk_reclaim::monitor::snapshot::DiskUsageSnapshot;
use disk_reclaim::platform::pal::Platform;
use disk_reclaim::platform::system::SystemPlatform;
use disk_reclaim::reclaim::defaults;
use disk_reclaim::reclaim::large_files::scan_large_files;
use disk_reclaim::reclaim::matrix::Disposition;
use disk_reclaim::reclaim::orchestrator::{Orchestrator, RunOptions, RunOutcome};
use disk_reclaim::reclaim::removal::AgeBasis;

/// Environment variable selecting `json`, `human` or `auto` output.
const OUTPUT_FORMAT_ENV: &str = "RECLAIM_OUTPUT_FORMAT";

/// Reclaim disk space from temp, cache and log artifacts by tier.
#[derive(Debug, Parser)]
#[command(
    name = "reclaim",
    author,
    version,
    about = "Tiered, privilege-aware disk-space reclamation",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Echo every session-log record, including each removed path.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Echo warnings and errors only.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run a cleanup pass.
    Clean(CleanArgs),
    /// Show which tasks a run would execute, without deleting anything.
    Plan(PlanArgs),
    /// Show free space on every fixed volume.
    Snapshot,
    /// List large disk images and update packages (report only).
    ScanLarge(ScanLargeArgs),
    /// Inspect configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct CleanArgs {
    /// Cleanup tier; prompted for when omitted.
    #[arg(long, value_name = "TIER")]
    tier: Option<CleanupTier>,
    /// Age threshold in days for age-filtered tasks.
    #[arg(long, value_name = "DAYS", value_parser = clap::value_parser!(u32).range(..=36_500))]
    age_days: Option<u32>,
    /// Timestamp that decides an entry's age.
    #[arg(long, value_name = "BASIS")]
    age_basis: Option<AgeBasis>,
    /// Continue with user-scope tasks when not elevated, without asking.
    #[arg(long)]
    allow_unelevated: bool,
    /// Include the update download cache at the light tier.
    #[arg(long)]
    include_update_cache: bool,
    /// Scan for large files after cleanup.
    #[arg(long)]
    scan_large_files: bool,
    /// Root of the large-file scan.
    #[arg(long, value_name = "PATH")]
    large_file_root: Option<PathBuf>,
    /// Directory for the session log.
    #[arg(long, value_name = "PATH")]
    log_dir: Option<PathBuf>,
    /// Resolve task patterns under this directory instead of the live system.
    #[arg(long, value_name = "PATH")]
    root: Option<PathBuf>,
    /// Never prompt; unanswered questions take their defaults.
    #[arg(long)]
    non_interactive: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct PlanArgs {
    /// Tier to plan for.
    #[arg(long, value_name = "TIER", default_value_t = CleanupTier::Light)]
    tier: CleanupTier,
    /// Plan as an unelevated user.
    #[arg(long, conflicts_with = "as_admin")]
    as_user: bool,
    /// Plan as an administrator.
    #[arg(long)]
    as_admin: bool,
    /// Include the update download cache at the light tier.
    #[arg(long)]
    include_update_cache: bool,
}

#[derive(Debug, Clone, Args, Default)]
struct ScanLargeArgs {
    /// Directory to scan; the system root when omitted.
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,
    /// Maximum number of files to list.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    top: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the configuration file path.
    Path,
    /// Print the built-in default configuration, task matrix included.
    Default,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// The operator chose not to continue.
    #[error("run declined by operator")]
    Declined,
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Declined => 5,
        }
    }
}

impl From<RclError> for CliError {
    fn from(err: RclError) -> Self {
        match err {
            RclError::InvalidConfig { .. }
            | RclError::MissingConfig { .. }
            | RclError::ConfigParse { .. }
            | RclError::Pattern { .. } => Self::User(err.to_string()),
            RclError::Serialization { .. } => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Clean(args) => run_clean(cli, args),
        Command::Plan(args) => run_plan(cli, args),
        Command::Snapshot => run_snapshot(cli),
        Command::ScanLarge(args) => run_scan_large(cli, args),
        Command::Config(args) => run_config(cli, args.command),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn run_clean(cli: &Cli, args: &CleanArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let matrix = config.matrix()?;
    let mode = output_mode(cli);

    let mut options = RunOptions::from_config(&config);
    options.tier = args.tier;
    if let Some(days) = args.age_days {
        options.age_days = days;
    }
    if let Some(basis) = args.age_basis {
        options.age_basis = basis;
    }
    options.allow_unelevated = args.allow_unelevated;
    options.include_service_tasks = args.include_update_cache.then_some(true);
    options.scan_large_files = args.scan_large_files.then_some(true);
    if let Some(root) = &args.large_file_root {
        options.large_file_root = Some(root.clone());
    }
    if let Some(dir) = &args.log_dir {
        options.log_dir.clone_from(dir);
    }
    options.echo = console_echo(cli, mode);

    let paths = args
        .root
        .as_deref()
        .map_or_else(PathContext::detect, PathContext::rooted_at);
    let platform = SystemPlatform::new();
    let orchestrator = Orchestrator::new(&platform, &matrix, &paths, options);

    let interactive = !args.non_interactive && io::stdin().is_terminal();
    let outcome = if interactive {
        let output: Box<dyn Write> = match mode {
            OutputMode::Human => Box::new(io::stdout()),
            OutputMode::Json => Box::new(io::stderr()),
        };
        let mut prompter = ConsolePrompter::new(io::stdin().lock(), output);
        orchestrator.run(&mut prompter)?
    } else {
        let mut prompter = ScriptedPrompter::new();
        orchestrator.run(&mut prompter)?
    };

    let report = match outcome {
        RunOutcome::Completed(report) => report,
        RunOutcome::Declined => return Err(CliError::Declined),
    };
    match mode {
        OutputMode::Human => {
            print!("{}", format_run_report(&report));
            Ok(())
        }
        OutputMode::Json => write_json_line(&serde_json::to_value(&*report)?),
    }
}

#[derive(Debug, Serialize)]
struct PlanRow<'a> {
    id: &'a str,
    description: &'a str,
    min_tier: CleanupTier,
    requires_elevation: bool,
    pauses_service: bool,
    kind: &'static str,
    target: String,
    disposition: Disposition,
}

fn run_plan(cli: &Cli, args: &PlanArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let matrix = config.matrix()?;
    let privilege = if args.as_user {
        PrivilegeLevel::Standard
    } else if args.as_admin {
        PrivilegeLevel::Elevated
    } else {
        SystemPlatform::new().privilege_level()
    };
    let include = args.tier > CleanupTier::Light || args.include_update_cache;
    let plan = matrix.plan(args.tier, privilege, include);

    match output_mode(cli) {
        OutputMode::Human => {
            print!("{}", format_plan(&plan, args.tier, privilege));
            Ok(())
        }
        OutputMode::Json => {
            let rows: Vec<PlanRow<'_>> = plan
                .iter()
                .map(|planned| PlanRow {
                    id: &planned.task.id,
                    description: &planned.task.description,
                    min_tier: planned.task.min_tier,
                    requires_elevation: planned.task.requires_elevation,
                    pauses_service: planned.task.pauses_service,
                    kind: planned.task.action.kind(),
                    target: planned.task.action.target(),
                    disposition: planned.disposition,
                })
                .collect();
            write_json_line(&json!({
                "command": "plan",
                "tier": args.tier,
                "privilege": privilege,
                "tasks": rows,
            }))
        }
    }
}

fn run_snapshot(cli: &Cli) -> Result<(), CliError> {
    let snapshot = DiskUsageSnapshot::capture(&SystemPlatform::new())?;
    match output_mode(cli) {
        OutputMode::Human => {
            print!("{}", format_snapshot(&snapshot));
            Ok(())
        }
        OutputMode::Json => write_json_line(&serde_json::to_value(&snapshot)?),
    }
}

fn run_scan_large(cli: &Cli, args: &ScanLargeArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let mut large = config.large_files.clone();
    if let Some(top) = args.top {
        large.top = usize::try_from(top).unwrap_or(usize::MAX);
    }
    let root = args
        .root
        .clone()
        .or_else(|| large.root.clone())
        .unwrap_or_else(|| PathContext::detect().root);
    if !root.is_dir() {
        return Err(CliError::User(format!(
            "scan root {} is not a directory",
            root.display()
        )));
    }
    let report = scan_large_files(&root, &large);
    match output_mode(cli) {
        OutputMode::Human => {
            print!("{}", format_large_files(&report));
            Ok(())
        }
        OutputMode::Json => write_json_line(&serde_json::to_value(&report)?),
    }
}

fn run_config(cli: &Cli, command: ConfigCommand) -> Result<(), CliError> {
    let mode = output_mode(cli);
    match command {
        ConfigCommand::Path => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            match mode {
                OutputMode::Human => println!("{}", path.display()),
                OutputMode::Json => write_json_line(&json!({
                    "command": "config path",
                    "path": path,
                    "exists": path.exists(),
                }))?,
            }
            Ok(())
        }
        ConfigCommand::Show | ConfigCommand::Default => {
            let config = if matches!(command, ConfigCommand::Show) {
                Config::load(cli.config.as_deref())?
            } else {
                Config {
                    tasks: Some(defaults::default_matrix().tasks().to_vec()),
                    ..Config::default()
                }
            };
            match mode {
                OutputMode::Human => {
                    print!("{}", config.to_toml()?);
                    Ok(())
                }
                OutputMode::Json => write_json_line(&serde_json::to_value(&config)?),
            }
        }
    }
}

fn console_echo(cli: &Cli, mode: OutputMode) -> ConsoleEcho {
    if mode == OutputMode::Json {
        ConsoleEcho::Off
    } else if cli.quiet {
        ConsoleEcho::Quiet
    } else if cli.verbose {
        ConsoleEcho::Verbose
    } else {
        ConsoleEcho::Normal
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var(OUTPUT_FORMAT_ENV).ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn output_mode_resolution_honors_precedence() {
        assert_eq!(
            resolve_output_mode(true, Some("human"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("json"), true),
            OutputMode::Json
        );
        assert_eq!(
            resolve_output_mode(false, Some("human"), false),
            OutputMode::Human
        );
        assert_eq!(
            resolve_output_mode(false, Some("auto"), true),
            OutputMode::Human
        );
        assert_eq!(resolve_output_mode(false, None, false), OutputMode::Json);
    }

    #[test]
    fn clean_flags_parse() {
        let cli = Cli::try_parse_from([
            "reclaim",
            "clean",
            "--tier",
            "deep",
            "--age-days",
            "7",
            "--age-basis",
            "modified",
            "--non-interactive",
        ])
        .unwrap();
        let Command::Clean(args) = cli.command else {
            panic!("expected clean");
        };
        assert_eq!(args.tier, Some(CleanupTier::Deep));
        assert_eq!(args.age_days, Some(7));
        assert_eq!(args.age_basis, Some(AgeBasis::Modified));
        assert!(args.non_interactive);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Cli::try_parse_from(["reclaim", "clean", "--tier", "extreme"]).is_err());
        assert!(Cli::try_parse_from(["reclaim", "clean", "--age-days", "40000"]).is_err());
        assert!(Cli::try_parse_from(["reclaim", "plan", "--as-user", "--as-admin"]).is_err());
    }

    #[test]
    fn error_mapping_follows_exit_code_contract() {
        let user: CliError = RclError::InvalidConfig {
            details: "x".to_string(),
        }
        .into();
        assert_eq!(user.exit_code(), 1);
        let runtime: CliError = RclError::Runtime {
            details: "x".to_string(),
        }
        .into();
        assert_eq!(runtime.exit_code(), 2);
        assert_eq!(CliError::Declined.exit_code(), 5);
    }
}
