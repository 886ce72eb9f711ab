//! Live implementation of the platform abstraction.

use std::collections::HashSet;
#[cfg(windows)]
use std::process::{Command, Stdio};

use sysinfo::{Disks, System};

use crate::core::errors::Result;
use crate::core::tier::PrivilegeLevel;
use crate::platform::pal::{Platform, ProcessRunner, ServiceManager, VolumeUsage};
use crate::platform::process::SystemProcessRunner;
use crate::platform::service::{
    ScServiceManager, SystemctlServiceManager, UnsupportedServiceManager,
};

/// File systems reached over the network.
const NETWORK_FS: &[&str] = &[
    "nfs", "nfs4", "cifs", "smb", "smbfs", "smb2", "smb3", "afpfs", "sshfs", "fuse.sshfs",
    "davfs", "webdav", "9p", "ceph", "glusterfs", "fuse.glusterfs",
];

/// Optical media.
const OPTICAL_FS: &[&str] = &["iso9660", "udf", "cdfs"];

/// Kernel, memory-backed and image file systems that hold no reclaimable data.
const PSEUDO_FS: &[&str] = &[
    "tmpfs", "devtmpfs", "ramfs", "proc", "sysfs", "cgroup", "cgroup2", "overlay", "squashfs",
    "autofs", "devfs", "debugfs", "tracefs", "securityfs", "pstore", "efivarfs", "nullfs",
];

/// Whether a volume counts as a fixed local disk.
#[must_use]
pub fn is_fixed_volume(file_system: &str, is_removable: bool) -> bool {
    let fs = file_system.trim().to_ascii_lowercase();
    !is_removable
        && !fs.is_empty()
        && !NETWORK_FS.contains(&fs.as_str())
        && !OPTICAL_FS.contains(&fs.as_str())
        && !PSEUDO_FS.contains(&fs.as_str())
}

/// The running operating system.
pub struct SystemPlatform {
    services: Box<dyn ServiceManager>,
    runner: SystemProcessRunner,
}

impl SystemPlatform {
    #[must_use]
    pub fn new() -> Self {
        let services: Box<dyn ServiceManager> = if cfg!(windows) {
            Box::new(ScServiceManager::new(SystemProcessRunner))
        } else if cfg!(target_os = "linux") {
            Box::new(SystemctlServiceManager::new(SystemProcessRunner))
        } else {
            Box::new(UnsupportedServiceManager)
        };
        Self {
            services,
            runner: SystemProcessRunner,
        }
    }
}

impl Default for SystemPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SystemPlatform {
    fn privilege_level(&self) -> PrivilegeLevel {
        detect_privilege()
    }

    fn fixed_volumes(&self) -> Result<Vec<VolumeUsage>> {
        let disks = Disks::new_with_refreshed_list();
        let mut seen = HashSet::new();
        let mut volumes = Vec::new();
        for disk in disks.list() {
            let file_system = disk.file_system().to_string_lossy().to_string();
            if !is_fixed_volume(&file_system, disk.is_removable()) {
                continue;
            }
            let mount_point = disk.mount_point().to_path_buf();
            if !seen.insert(mount_point.clone()) {
                continue;
            }
            volumes.push(VolumeUsage {
                id: mount_point.display().to_string(),
                mount_point,
                file_system,
                total_bytes: disk.total_space(),
                free_bytes: disk.available_space(),
            });
        }
        volumes.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(volumes)
    }

    fn host_name(&self) -> String {
        System::host_name()
            .or_else(|| std::env::var("COMPUTERNAME").ok())
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "localhost".to_string())
    }

    fn service_manager(&self) -> &dyn ServiceManager {
        self.services.as_ref()
    }

    fn process_runner(&self) -> &dyn ProcessRunner {
        &self.runner
    }
}

#[cfg(unix)]
fn detect_privilege() -> PrivilegeLevel {
    if nix::unistd::geteuid().is_root() {
        PrivilegeLevel::Elevated
    } else {
        PrivilegeLevel::Standard
    }
}

#[cfg(windows)]
fn detect_privilege() -> PrivilegeLevel {
    // `net session` is only permitted from an elevated token.
    let elevated = Command::new("net")
        .arg("session")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success());
    if elevated {
        PrivilegeLevel::Elevated
    } else {
        PrivilegeLevel::Standard
    }
}

#[cfg(not(any(unix, windows)))]
fn detect_privilege() -> PrivilegeLevel {
    PrivilegeLevel::Standard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_volume_filter_drops_network_optical_and_pseudo() {
        assert!(is_fixed_volume("ext4", false));
        assert!(is_fixed_volume("NTFS", false));
        assert!(!is_fixed_volume("ext4", true));
        assert!(!is_fixed_volume("nfs4", false));
        assert!(!is_fixed_volume("fuse.sshfs", false));
        assert!(!is_fixed_volume("iso9660", false));
        assert!(!is_fixed_volume("tmpfs", false));
        assert!(!is_fixed_volume("", false));
    }

    #[test]
    fn host_name_is_never_empty() {
        assert!(!SystemPlatform::new().host_name().is_empty());
    }
}
