//! Point-in-time capacity and free space of every fixed volume.

#![allow(missing_docs)]

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::core::errors::Result;
use crate::platform::pal::{Platform, VolumeUsage};

/// Immutable once captured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskUsageSnapshot {
    pub captured_at: DateTime<Local>,
    pub volumes: Vec<VolumeUsage>,
}

impl DiskUsageSnapshot {
    pub fn capture(platform: &dyn Platform) -> Result<Self> {
        Ok(Self {
            captured_at: Local::now(),
            volumes: platform.fixed_volumes()?,
        })
    }

    /// Placeholder for a snapshot that could not be taken.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            captured_at: Local::now(),
            volumes: Vec::new(),
        }
    }

    #[must_use]
    pub fn volume(&self, id: &str) -> Option<&VolumeUsage> {
        self.volumes.iter().find(|v| v.id == id)
    }

    #[must_use]
    pub fn total_free_bytes(&self) -> u64 {
        self.volumes.iter().map(|v| v.free_bytes).sum()
    }
}

/// Change on one volume between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeDelta {
    pub id: String,
    pub total_bytes: u64,
    pub free_before: u64,
    pub free_after: u64,
    /// Positive when space was reclaimed; other activity on the volume can
    /// make it negative.
    pub freed_bytes: i64,
    pub free_pct_before: f64,
    pub free_pct_after: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotDiff {
    pub volumes: Vec<VolumeDelta>,
    pub total_freed_bytes: i64,
}

impl SnapshotDiff {
    /// Join by volume id. Volumes present in only one snapshot are left out.
    #[must_use]
    pub fn between(before: &DiskUsageSnapshot, after: &DiskUsageSnapshot) -> Self {
        let volumes: Vec<VolumeDelta> = before
            .volumes
            .iter()
            .filter_map(|old| {
                let new = after.volume(&old.id)?;
                Some(VolumeDelta {
                    id: old.id.clone(),
                    total_bytes: new.total_bytes,
                    free_before: old.free_bytes,
                    free_after: new.free_bytes,
                    freed_bytes: signed_delta(old.free_bytes, new.free_bytes),
                    free_pct_before: old.free_pct(),
                    free_pct_after: new.free_pct(),
                })
            })
            .collect();
        let total_freed_bytes = volumes.iter().map(|v| v.freed_bytes).sum();
        Self {
            volumes,
            total_freed_bytes,
        }
    }
}

fn signed_delta(before: u64, after: u64) -> i64 {
    if after >= before {
        i64::try_from(after - before).unwrap_or(i64::MAX)
    } else {
        i64::try_from(before - after).map_or(i64::MIN, |d| -d)
    }
}
