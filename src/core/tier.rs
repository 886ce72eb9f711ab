//! Cleanup tiers and privilege levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operator-selected aggressiveness level.
///
/// Tiers are totally ordered and inclusive: `Deep` runs everything `Standard`
/// runs, which runs everything `Light` runs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CleanupTier {
    /// Temp folders and the optional update download cache.
    #[default]
    Light,
    /// Adds system artifacts, per-user caches and the platform cleanup utility.
    Standard,
    /// Adds servicing logs and aged web-server logs.
    Deep,
}

impl CleanupTier {
    /// All tiers in ascending order.
    pub const ALL: [Self; 3] = [Self::Light, Self::Standard, Self::Deep];

    /// Whether a task gated to `required` runs at this tier.
    #[must_use]
    pub fn includes(self, required: Self) -> bool {
        self >= required
    }

    /// Lowercase label used in config files, flags and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Standard => "standard",
            Self::Deep => "deep",
        }
    }
}

impl fmt::Display for CleanupTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" | "1" => Ok(Self::Light),
            "standard" | "2" => Ok(Self::Standard),
            "deep" | "3" => Ok(Self::Deep),
            other => Err(format!(
                "unknown tier '{other}' (expected light, standard or deep)"
            )),
        }
    }
}

/// Privilege of the running process, resolved once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeLevel {
    /// Administrator-equivalent rights.
    Elevated,
    /// Ordinary user rights; only user-scope tasks are eligible.
    Standard,
}

impl PrivilegeLevel {
    #[must_use]
    pub const fn is_elevated(self) -> bool {
        matches!(self, Self::Elevated)
    }

    /// Whether a task with the given elevation requirement may run.
    #[must_use]
    pub const fn permits(self, requires_elevation: bool) -> bool {
        !requires_elevation || self.is_elevated()
    }
}

impl fmt::Display for PrivilegeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Elevated => "elevated",
            Self::Standard => "standard",
        })
    }
}
