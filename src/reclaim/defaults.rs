//! Built-in task matrices for Windows and Unix hosts.

use crate::core::tier::CleanupTier::{Deep, Light, Standard};
use crate::reclaim::matrix::{CleanupTask, TaskMatrix};

/// Age threshold for web-server logs, independent of the run threshold.
pub const WEB_LOG_AGE_DAYS: u32 = 60;

/// PowerShell exit code meaning the Configuration Manager client is absent.
const CCM_ABSENT_EXIT: i32 = 3;

const CCM_CACHE_SCRIPT: &str = "try { $mgr = New-Object -ComObject UIResource.UIResourceMgr -ErrorAction Stop } catch { exit 3 }; \
$cache = $mgr.GetCacheInfo(); \
foreach ($el in @($cache.GetCacheElements())) { $cache.DeleteCacheElement($el.CacheElementId) }; \
$cache.TotalSize = 5120";

/// Update agent paused around service-sensitive tasks.
#[must_use]
pub const fn default_service_name() -> &'static str {
    if cfg!(windows) {
        "wuauserv"
    } else {
        "unattended-upgrades"
    }
}

/// Matrix for the platform this binary was built for.
#[must_use]
pub fn default_matrix() -> TaskMatrix {
    if cfg!(windows) {
        windows_matrix()
    } else {
        unix_matrix()
    }
}

/// Windows matrix: temp folders, update cache, system and per-user caches,
/// Disk Cleanup, servicing and IIS logs.
#[must_use]
pub fn windows_matrix() -> TaskMatrix {
    let tasks = vec![
        CleanupTask::age_filtered("user-temp", "Current user's temp folder", Light, "{temp}"),
        CleanupTask::age_filtered(
            "all-users-temp",
            "Every profile's temp folder",
            Light,
            "{users}\\*\\AppData\\Local\\Temp\\*",
        )
        .elevated(),
        CleanupTask::age_filtered("windows-temp", "Windows temp folder", Light, "{system_root}\\Temp")
            .elevated(),
        CleanupTask::unconditional(
            "update-download-cache",
            "Windows Update download cache",
            Light,
            "{system_root}\\SoftwareDistribution\\Download",
        )
        .elevated()
        .pausing_service(),
        CleanupTask::external(
            "ccm-cache",
            "Configuration Manager client cache",
            Standard,
            "powershell.exe",
            &["-NoProfile", "-NonInteractive", "-Command", CCM_CACHE_SCRIPT],
        )
        .elevated()
        .with_absent_exit_codes(&[CCM_ABSENT_EXIT]),
        CleanupTask::unconditional(
            "error-reports",
            "Queued Windows Error Reporting data",
            Standard,
            "{program_data}\\Microsoft\\Windows\\WER\\ReportQueue",
        )
        .elevated(),
        CleanupTask::unconditional("minidumps", "Kernel minidumps", Standard, "{system_root}\\Minidump")
            .elevated(),
        CleanupTask::unconditional(
            "memory-dump",
            "Full memory dump",
            Standard,
            "{system_root}\\MEMORY.DMP",
        )
        .elevated(),
        CleanupTask::unconditional(
            "delivery-optimization",
            "Delivery Optimization cache",
            Standard,
            "{system_root}\\ServiceProfiles\\NetworkService\\AppData\\Local\\Microsoft\\Windows\\DeliveryOptimization\\Cache",
        )
        .elevated(),
        CleanupTask::unconditional(
            "inet-cache",
            "Per-user Internet cache",
            Standard,
            "{users}\\*\\AppData\\Local\\Microsoft\\Windows\\INetCache\\*",
        )
        .elevated(),
        CleanupTask::unconditional(
            "user-crash-dumps",
            "Per-user application crash dumps",
            Standard,
            "{users}\\*\\AppData\\Local\\CrashDumps\\*",
        )
        .elevated(),
        CleanupTask::unconditional(
            "thumbnail-cache",
            "Per-user Explorer thumbnail cache",
            Standard,
            "{users}\\*\\AppData\\Local\\Microsoft\\Windows\\Explorer\\thumbcache_*.db",
        )
        .elevated(),
        CleanupTask::external(
            "disk-cleanup",
            "Disk Cleanup with saved profile 1",
            Standard,
            "cleanmgr.exe",
            &["/sagerun:1"],
        )
        .elevated(),
        CleanupTask::unconditional(
            "servicing-logs",
            "Component servicing (CBS) logs",
            Deep,
            "{system_root}\\Logs\\CBS",
        )
        .elevated(),
        CleanupTask::age_filtered(
            "web-server-logs",
            "IIS logs",
            Deep,
            "{root}\\inetpub\\logs\\LogFiles",
        )
        .elevated()
        .with_age_days(WEB_LOG_AGE_DAYS),
    ];
    TaskMatrix::new(tasks).unwrap_or_else(|err| unreachable!("built-in matrix is valid: {err}"))
}

/// Unix matrix: temp and trash, package download cache, crash dumps,
/// per-user caches, journal vacuum, rotated and web-server logs.
#[must_use]
pub fn unix_matrix() -> TaskMatrix {
    let tasks = vec![
        CleanupTask::age_filtered("user-temp", "Temporary files", Light, "{temp}"),
        CleanupTask::age_filtered(
            "user-trash",
            "Current user's trash",
            Light,
            "{home}/.local/share/Trash/files",
        ),
        CleanupTask::age_filtered("var-tmp", "Persistent temp folder", Light, "{root}/var/tmp")
            .elevated(),
        CleanupTask::unconditional(
            "package-download-cache",
            "Downloaded package archives",
            Light,
            "{root}/var/cache/apt/archives/*.deb",
        )
        .elevated()
        .pausing_service(),
        CleanupTask::unconditional("crash-reports", "Crash reports", Standard, "{root}/var/crash")
            .elevated(),
        CleanupTask::unconditional(
            "core-dumps",
            "Stored core dumps",
            Standard,
            "{root}/var/lib/systemd/coredump",
        )
        .elevated(),
        CleanupTask::unconditional(
            "thumbnail-cache",
            "Per-user thumbnail cache",
            Standard,
            "{users}/*/.cache/thumbnails/*",
        )
        .elevated(),
        CleanupTask::unconditional(
            "browser-cache",
            "Per-user Firefox disk cache",
            Standard,
            "{users}/*/.cache/mozilla/firefox/*/cache2/*",
        )
        .elevated(),
        CleanupTask::external(
            "journal-vacuum",
            "Vacuum the systemd journal",
            Standard,
            "journalctl",
            &["--vacuum-time=30d"],
        )
        .elevated(),
        CleanupTask::unconditional(
            "rotated-logs-compressed",
            "Compressed rotated system logs",
            Deep,
            "{root}/var/log/*.gz",
        )
        .elevated(),
        CleanupTask::unconditional(
            "rotated-logs-numbered",
            "Numbered rotated system logs",
            Deep,
            "{root}/var/log/*.[0-9]",
        )
        .elevated(),
        CleanupTask::age_filtered("web-server-logs", "nginx logs", Deep, "{root}/var/log/nginx")
            .elevated()
            .with_age_days(WEB_LOG_AGE_DAYS),
        CleanupTask::age_filtered(
            "apache-logs",
            "Apache logs (Debian layout)",
            Deep,
            "{root}/var/log/apache2",
        )
        .elevated()
        .with_age_days(WEB_LOG_AGE_DAYS),
        CleanupTask::age_filtered(
            "httpd-logs",
            "Apache logs (Red Hat layout)",
            Deep,
            "{root}/var/log/httpd",
        )
        .elevated()
        .with_age_days(WEB_LOG_AGE_DAYS),
    ];
    TaskMatrix::new(tasks).unwrap_or_else(|err| unreachable!("built-in matrix is valid: {err}"))
}
