//! disk_reclaim: tiered, privilege-aware disk-space reclamation.
//!
//! A run walks an immutable [`reclaim::matrix::TaskMatrix`] of cleanup tasks,
//! gated by an operator-selected [`core::tier::CleanupTier`] and the
//! process's [`core::tier::PrivilegeLevel`], removes stale temp, cache and log
//! artifacts on a best-effort basis, and reports free space before and after.

pub mod cli;
pub mod core;
pub mod logger;
pub mod monitor;
pub mod platform;
pub mod reclaim;
