//! Report-only scan for large disk images and update packages.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::core::config::LargeFileConfig;

/// Directories never descended into.
const SKIP_DIRS: &[&str] = &["$Recycle.Bin", "System Volume Information", "proc", "sys"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LargeFile {
    pub path: PathBuf,
    pub bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LargeFileReport {
    pub root: PathBuf,
    /// Largest first, ties broken by path.
    pub files: Vec<LargeFile>,
    /// Matching files beyond the `top` cap.
    pub truncated: usize,
    /// Entries the walk could not read.
    pub unreadable: usize,
}

impl LargeFileReport {
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }
}

/// Walk `root` for files whose extension is listed in `config`.
#[must_use]
pub fn scan_large_files(root: &Path, config: &LargeFileConfig) -> LargeFileReport {
    let extensions: Vec<String> = config
        .extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .collect();
    let mut report = LargeFileReport {
        root: root.to_path_buf(),
        ..LargeFileReport::default()
    };

    let walker = WalkDir::new(root)
        .follow_links(false)
        .follow_root_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !SKIP_DIRS
                    .iter()
                    .any(|skip| entry.file_name().to_string_lossy() == *skip)
        });

    let mut files = Vec::new();
    for entry in walker {
        let Ok(entry) = entry else {
            report.unreadable += 1;
            continue;
        };
        if !entry.file_type().is_file() || !has_extension(entry.path(), &extensions) {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            report.unreadable += 1;
            continue;
        };
        if meta.len() >= config.min_size_bytes {
            files.push(LargeFile {
                path: entry.into_path(),
                bytes: meta.len(),
            });
        }
    }

    files.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.path.cmp(&b.path)));
    report.truncated = files.len().saturating_sub(config.top);
    files.truncate(config.top);
    report.files = files;
    report
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| extensions.iter().any(|wanted| *wanted == ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, len: usize) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, vec![0_u8; len]).unwrap();
    }

    #[test]
    fn lists_matching_files_largest_first() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("images/b.iso"), 300);
        write(&dir.path().join("images/a.ISO"), 300);
        write(&dir.path().join("vm/disk.vhdx"), 900);
        write(&dir.path().join("updates/kb.msu"), 10);
        write(&dir.path().join("notes.txt"), 5000);

        let report = scan_large_files(dir.path(), &LargeFileConfig::default());
        let names: Vec<String> = report
            .files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, ["disk.vhdx", "a.ISO", "b.iso", "kb.msu"]);
        assert_eq!(report.total_bytes(), 1510);
        assert_eq!(report.truncated, 0);
    }

    #[test]
    fn cap_and_minimum_size_apply() {
        let dir = tempfile::tempdir().unwrap();
        for (i, len) in [100, 200, 300, 5].into_iter().enumerate() {
            write(&dir.path().join(format!("img{i}.iso")), len);
        }
        let config = LargeFileConfig {
            top: 2,
            min_size_bytes: 50,
            ..LargeFileConfig::default()
        };
        let report = scan_large_files(dir.path(), &config);
        assert_eq!(report.files.len(), 2);
        assert_eq!(report.files[0].bytes, 300);
        assert_eq!(report.truncated, 1);
    }

    #[test]
    fn missing_root_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let report = scan_large_files(&dir.path().join("absent"), &LargeFileConfig::default());
        assert!(report.files.is_empty());
        assert_eq!(report.unreadable, 1);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_root_is_not_descended() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("elsewhere/huge.iso"), 400);
        let link = dir.path().join("mnt");
        std::os::unix::fs::symlink(dir.path().join("elsewhere"), &link).unwrap();

        let report = scan_large_files(&link, &LargeFileConfig::default());
        assert!(report.files.is_empty());
    }
}
