//! The task matrix: an immutable, ordered table of cleanup actions gated by
//! tier and privilege.

#![allow(missing_docs)]

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::errors::{RclError, Result};
use crate::core::tier::{CleanupTier, PrivilegeLevel};

/// What a task does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TaskAction {
    /// Remove entries older than `age_days` (the run threshold when unset).
    AgeFiltered {
        pattern: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        age_days: Option<u32>,
    },
    /// Remove everything the pattern names.
    Unconditional { pattern: String },
    /// Run an external utility. Exit codes listed in `absent_exit_codes`
    /// mean the thing it manages is not present on this machine.
    External {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        absent_exit_codes: Vec<i32>,
    },
}

impl TaskAction {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AgeFiltered { .. } => "age-filtered",
            Self::Unconditional { .. } => "unconditional",
            Self::External { .. } => "external",
        }
    }

    /// Pattern or command line, for display.
    #[must_use]
    pub fn target(&self) -> String {
        match self {
            Self::AgeFiltered { pattern, .. } | Self::Unconditional { pattern } => pattern.clone(),
            Self::External { program, args, .. } => {
                let mut line = program.clone();
                for arg in args {
                    line.push(' ');
                    line.push_str(arg);
                }
                line
            }
        }
    }
}

/// One row of the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupTask {
    pub id: String,
    pub description: String,
    pub min_tier: CleanupTier,
    #[serde(default)]
    pub requires_elevation: bool,
    /// Touches the update agent's working directory; the service is paused
    /// around these tasks.
    #[serde(default)]
    pub pauses_service: bool,
    #[serde(flatten)]
    pub action: TaskAction,
}

impl CleanupTask {
    fn new(id: &str, description: &str, min_tier: CleanupTier, action: TaskAction) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            min_tier,
            requires_elevation: false,
            pauses_service: false,
            action,
        }
    }

    /// Age-filtered removal using the run threshold.
    #[must_use]
    pub fn age_filtered(id: &str, description: &str, min_tier: CleanupTier, pattern: &str) -> Self {
        Self::new(
            id,
            description,
            min_tier,
            TaskAction::AgeFiltered {
                pattern: pattern.to_string(),
                age_days: None,
            },
        )
    }

    #[must_use]
    pub fn unconditional(id: &str, description: &str, min_tier: CleanupTier, pattern: &str) -> Self {
        Self::new(
            id,
            description,
            min_tier,
            TaskAction::Unconditional {
                pattern: pattern.to_string(),
            },
        )
    }

    #[must_use]
    pub fn external(
        id: &str,
        description: &str,
        min_tier: CleanupTier,
        program: &str,
        args: &[&str],
    ) -> Self {
        Self::new(
            id,
            description,
            min_tier,
            TaskAction::External {
                program: program.to_string(),
                args: args.iter().map(|a| (*a).to_string()).collect(),
                absent_exit_codes: Vec::new(),
            },
        )
    }

    #[must_use]
    pub fn elevated(mut self) -> Self {
        self.requires_elevation = true;
        self
    }

    #[must_use]
    pub fn pausing_service(mut self) -> Self {
        self.pauses_service = true;
        self
    }

    /// Fixed age threshold for an age-filtered task.
    #[must_use]
    pub fn with_age_days(mut self, days: u32) -> Self {
        if let TaskAction::AgeFiltered { age_days, .. } = &mut self.action {
            *age_days = Some(days);
        }
        self
    }

    #[must_use]
    pub fn with_absent_exit_codes(mut self, codes: &[i32]) -> Self {
        if let TaskAction::External {
            absent_exit_codes, ..
        } = &mut self.action
        {
            *absent_exit_codes = codes.to_vec();
        }
        self
    }

    /// Tier and privilege gates, ignoring the service opt-in.
    #[must_use]
    pub fn eligible(&self, tier: CleanupTier, privilege: PrivilegeLevel) -> bool {
        tier.includes(self.min_tier) && privilege.permits(self.requires_elevation)
    }
}

/// Why a task will or will not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    Run,
    /// Gated to a higher tier than the one selected.
    AboveTier,
    /// Requires elevation the process does not have.
    NeedsElevation,
    /// Service-sensitive task the operator left out.
    OptedOut,
}

/// A task paired with its disposition for one run.
#[derive(Debug, Clone, Copy)]
pub struct PlannedTask<'a> {
    pub task: &'a CleanupTask,
    pub disposition: Disposition,
}

/// Ordered, validated set of tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMatrix {
    tasks: Vec<CleanupTask>,
}

impl TaskMatrix {
    /// Validate and order the tasks: Light rows first, then Standard, then
    /// Deep, keeping declaration order within a tier.
    pub fn new(mut tasks: Vec<CleanupTask>) -> Result<Self> {
        let mut seen = HashSet::new();
        for task in &tasks {
            if task.id.trim().is_empty() {
                return Err(invalid("task id must not be empty".to_string()));
            }
            if !seen.insert(task.id.as_str()) {
                return Err(invalid(format!("duplicate task id '{}'", task.id)));
            }
            let target_empty = match &task.action {
                TaskAction::AgeFiltered { pattern, .. } | TaskAction::Unconditional { pattern } => {
                    pattern.trim().is_empty()
                }
                TaskAction::External { program, .. } => program.trim().is_empty(),
            };
            if target_empty {
                return Err(invalid(format!("task '{}' has an empty target", task.id)));
            }
        }
        tasks.sort_by_key(|task| task.min_tier);
        Ok(Self { tasks })
    }

    #[must_use]
    pub fn tasks(&self) -> &[CleanupTask] {
        &self.tasks
    }

    /// Whether any task eligible at this tier and privilege pauses the service.
    #[must_use]
    pub fn has_service_sensitive(&self, tier: CleanupTier, privilege: PrivilegeLevel) -> bool {
        self.tasks
            .iter()
            .any(|task| task.pauses_service && task.eligible(tier, privilege))
    }

    /// Disposition of every task for one run, in walk order.
    #[must_use]
    pub fn plan(
        &self,
        tier: CleanupTier,
        privilege: PrivilegeLevel,
        include_service_tasks: bool,
    ) -> Vec<PlannedTask<'_>> {
        self.tasks
            .iter()
            .map(|task| {
                let disposition = if !tier.includes(task.min_tier) {
                    Disposition::AboveTier
                } else if !privilege.permits(task.requires_elevation) {
                    Disposition::NeedsElevation
                } else if task.pauses_service && !include_service_tasks {
                    Disposition::OptedOut
                } else {
                    Disposition::Run
                };
                PlannedTask { task, disposition }
            })
            .collect()
    }
}

fn invalid(details: String) -> RclError {
    RclError::InvalidConfig { details }
}
