//! Pausing and resuming the update agent around service-sensitive tasks.
//!
//! Nothing here is fatal: every stop or start yields a
//! [`ServiceActionResult`], and anything other than `Done` becomes a warning
//! in the session log.

#![allow(missing_docs)]

use std::path::Path;

use crate::logger::session::RunLog;
use crate::platform::pal::{ProcessExit, ProcessRunner, ServiceActionResult, ServiceManager};

/// Stops and restarts one named service, logging each attempt.
pub struct ServiceCoordinator<'a> {
    manager: &'a dyn ServiceManager,
    name: &'a str,
}

impl<'a> ServiceCoordinator<'a> {
    #[must_use]
    pub fn new(manager: &'a dyn ServiceManager, name: &'a str) -> Self {
        Self { manager, name }
    }

    #[must_use]
    pub const fn name(&self) -> &str {
        self.name
    }

    pub fn stop(&self, log: &mut dyn RunLog) -> ServiceActionResult {
        log.info("service.stop", &format!("Stopping service {}", self.name));
        let result = self.manager.stop(self.name);
        self.report("service.stop", "stop", &result, log);
        result
    }

    pub fn start(&self, log: &mut dyn RunLog) -> ServiceActionResult {
        log.info("service.start", &format!("Starting service {}", self.name));
        let result = self.manager.start(self.name);
        self.report("service.start", "start", &result, log);
        result
    }

    fn report(&self, event: &str, verb: &str, result: &ServiceActionResult, log: &mut dyn RunLog) {
        match result {
            ServiceActionResult::Done => {
                log.verbose(event, &format!("Service {} {verb} complete", self.name));
            }
            ServiceActionResult::NotInstalled => {
                log.warn(event, &format!("Service {} is not installed", self.name));
            }
            ServiceActionResult::AlreadyInState => {
                let state = if verb == "stop" { "stopped" } else { "running" };
                log.warn(event, &format!("Service {} was already {state}", self.name));
            }
            ServiceActionResult::Failed(details) => {
                log.warn(
                    event,
                    &format!("Could not {verb} service {}: {details}", self.name),
                );
            }
        }
    }
}

/// LSB status code `is-active` returns for an unknown unit.
const SYSTEMCTL_NO_SUCH_UNIT: i32 = 4;

/// Service control through `systemctl`.
pub struct SystemctlServiceManager<R: ProcessRunner> {
    runner: R,
}

impl<R: ProcessRunner> SystemctlServiceManager<R> {
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    fn systemctl(&self, args: &[&str]) -> std::result::Result<ProcessExit, String> {
        let program = self
            .runner
            .locate("systemctl")
            .ok_or_else(|| "systemctl not found".to_string())?;
        let args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        self.runner.run(&program, &args).map_err(|e| e.to_string())
    }

    fn unit(name: &str) -> String {
        if Path::new(name).extension().is_some() {
            name.to_string()
        } else {
            format!("{name}.service")
        }
    }

    fn transition(&self, verb: &str, name: &str, want_active: bool) -> ServiceActionResult {
        let unit = Self::unit(name);
        // is-active cannot tell a missing unit from a stopped one.
        match self.systemctl(&["show", "-p", "LoadState", "--value", &unit]) {
            Ok(exit) if exit.success() && exit.stdout.trim() == "not-found" => {
                return ServiceActionResult::NotInstalled;
            }
            Ok(_) => {}
            Err(err) => return ServiceActionResult::Failed(err),
        }
        let active = match self.systemctl(&["is-active", "--quiet", &unit]) {
            Ok(exit) if exit.code == Some(SYSTEMCTL_NO_SUCH_UNIT) => {
                return ServiceActionResult::NotInstalled;
            }
            Ok(exit) => exit.success(),
            Err(err) => return ServiceActionResult::Failed(err),
        };
        if active == want_active {
            return ServiceActionResult::AlreadyInState;
        }
        match self.systemctl(&[verb, &unit]) {
            Ok(exit) if exit.success() => ServiceActionResult::Done,
            Ok(exit) if is_missing_unit(&exit) => ServiceActionResult::NotInstalled,
            Ok(exit) => ServiceActionResult::Failed(describe_exit(&exit)),
            Err(err) => ServiceActionResult::Failed(err),
        }
    }
}

impl<R: ProcessRunner> ServiceManager for SystemctlServiceManager<R> {
    fn stop(&self, name: &str) -> ServiceActionResult {
        self.transition("stop", name, false)
    }

    fn start(&self, name: &str) -> ServiceActionResult {
        self.transition("start", name, true)
    }
}

fn is_missing_unit(exit: &ProcessExit) -> bool {
    exit.code == Some(5)
        || exit.stderr.contains("not loaded")
        || exit.stderr.contains("not found")
}

/// Service control through `sc.exe`.
pub struct ScServiceManager<R: ProcessRunner> {
    runner: R,
}

/// ERROR_SERVICE_DOES_NOT_EXIST.
const SC_NOT_INSTALLED: i32 = 1060;
/// ERROR_SERVICE_NOT_ACTIVE.
const SC_NOT_ACTIVE: i32 = 1062;
/// ERROR_SERVICE_ALREADY_RUNNING.
const SC_ALREADY_RUNNING: i32 = 1056;

impl<R: ProcessRunner> ScServiceManager<R> {
    pub const fn new(runner: R) -> Self {
        Self { runner }
    }

    fn sc(&self, verb: &str, name: &str) -> ServiceActionResult {
        let Some(program) = self.runner.locate("sc.exe") else {
            return ServiceActionResult::Failed("sc.exe not found".to_string());
        };
        let args = [verb.to_string(), name.to_string()];
        match self.runner.run(&program, &args) {
            Ok(exit) => match exit.code {
                Some(0) => ServiceActionResult::Done,
                Some(SC_NOT_INSTALLED) => ServiceActionResult::NotInstalled,
                Some(SC_NOT_ACTIVE | SC_ALREADY_RUNNING) => ServiceActionResult::AlreadyInState,
                _ => ServiceActionResult::Failed(describe_exit(&exit)),
            },
            Err(err) => ServiceActionResult::Failed(err.to_string()),
        }
    }
}

impl<R: ProcessRunner> ServiceManager for ScServiceManager<R> {
    fn stop(&self, name: &str) -> ServiceActionResult {
        self.sc("stop", name)
    }

    fn start(&self, name: &str) -> ServiceActionResult {
        self.sc("start", name)
    }
}

/// Hosts without a supported service manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedServiceManager;

impl ServiceManager for UnsupportedServiceManager {
    fn stop(&self, _name: &str) -> ServiceActionResult {
        ServiceActionResult::Failed("no supported service manager on this platform".to_string())
    }

    fn start(&self, _name: &str) -> ServiceActionResult {
        ServiceActionResult::Failed("no supported service manager on this platform".to_string())
    }
}

fn describe_exit(exit: &ProcessExit) -> String {
    let detail = if exit.stderr.trim().is_empty() {
        exit.stdout.trim()
    } else {
        exit.stderr.trim()
    };
    match exit.code {
        Some(code) if detail.is_empty() => format!("exit code {code}"),
        Some(code) => format!("exit code {code}: {detail}"),
        None => "terminated by signal".to_string(),
    }
}
