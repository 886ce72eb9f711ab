//! Disk usage observation: before/after volume snapshots and their diff.

pub mod snapshot;
