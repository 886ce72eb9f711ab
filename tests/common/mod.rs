//! Shared harness for binary-level tests: runs `reclaim`, captures its
//! output and keeps a per-case transcript for post-mortem debugging.

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

/// Run the binary with `args` and no extra environment.
pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with_env(case_name, args, &[])
}

/// Run the binary with `args` and `env` overrides. Stdin is closed, so
/// every prompt takes its default.
pub fn run_cli_case_with_env(case_name: &str, args: &[&str], env: &[(&str, &str)]) -> CmdResult {
    let mut command = Command::new(env!("CARGO_BIN_EXE_reclaim"));
    command
        .args(args)
        .env_remove("RECLAIM_OUTPUT_FORMAT")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command.output().expect("failed to spawn reclaim binary");

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let log_dir = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("cli-cases");
    fs::create_dir_all(&log_dir).expect("create case log dir");
    let log_path = log_dir.join(format!("{case_name}.log"));
    let transcript = format!(
        "args: {args:?}\nenv: {env:?}\nstatus: {:?}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}\n",
        output.status.code()
    );
    fs::write(&log_path, transcript).expect("write case log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}
