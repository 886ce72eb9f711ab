//! Path-pattern placeholders and glob expansion.
//!
//! Task patterns are written against a small set of placeholders so the same
//! matrix can be pointed at the live system or at a scratch tree:
//!
//! | placeholder      | Unix                | Windows                    |
//! |------------------|---------------------|----------------------------|
//! | `{root}`         | `/`                 | `%SystemDrive%\`           |
//! | `{system_root}`  | `/`                 | `%SystemRoot%`             |
//! | `{program_data}` | `/var/lib`          | `%ProgramData%`            |
//! | `{users}`        | `/home` (`/Users`)  | `%SystemDrive%\Users`      |
//! | `{home}`         | current user home   | current user profile       |
//! | `{temp}`         | `std::env::temp_dir`| `std::env::temp_dir`       |

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::Serialize;

use crate::core::errors::{RclError, Result};

const PLACEHOLDERS: [&str; 6] = [
    "root",
    "system_root",
    "program_data",
    "users",
    "home",
    "temp",
];

/// Concrete values for the pattern placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathContext {
    pub root: PathBuf,
    pub system_root: PathBuf,
    pub program_data: PathBuf,
    pub users: PathBuf,
    pub home: PathBuf,
    pub temp: PathBuf,
}

impl PathContext {
    /// Resolve placeholder values for the running system.
    #[must_use]
    pub fn detect() -> Self {
        let temp = std::env::temp_dir();
        if cfg!(windows) {
            let drive = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
            let root = PathBuf::from(format!("{drive}\\"));
            let system_root = std::env::var_os("SystemRoot")
                .map_or_else(|| root.join("Windows"), PathBuf::from);
            let program_data = std::env::var_os("ProgramData")
                .map_or_else(|| root.join("ProgramData"), PathBuf::from);
            let users = root.join("Users");
            let home = dirs::home_dir().unwrap_or_else(|| users.join("Default"));
            Self {
                root,
                system_root,
                program_data,
                users,
                home,
                temp,
            }
        } else {
            let users = if cfg!(target_os = "macos") {
                PathBuf::from("/Users")
            } else {
                PathBuf::from("/home")
            };
            Self {
                root: PathBuf::from("/"),
                system_root: PathBuf::from("/"),
                program_data: PathBuf::from("/var/lib"),
                home: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root")),
                users,
                temp,
            }
        }
    }

    /// Every placeholder rooted inside `base`, for scratch trees and tests.
    #[must_use]
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            root: base.to_path_buf(),
            system_root: base.to_path_buf(),
            program_data: base.join("var").join("lib"),
            users: base.join("home"),
            home: base.join("home").join("operator"),
            temp: base.join("tmp"),
        }
    }

    fn value(&self, name: &str) -> Option<&Path> {
        match name {
            "root" => Some(&self.root),
            "system_root" => Some(&self.system_root),
            "program_data" => Some(&self.program_data),
            "users" => Some(&self.users),
            "home" => Some(&self.home),
            "temp" => Some(&self.temp),
            _ => None,
        }
    }

    /// Substitute placeholders in `template`.
    ///
    /// When `escape` is set, substituted values are glob-escaped so that
    /// metacharacters inside real directory names match literally.
    pub fn expand(&self, template: &str, escape: bool) -> Result<String> {
        let mut out = String::with_capacity(template.len() + 32);
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                return Err(pattern_error(template, "unterminated placeholder"));
            };
            let name = &after[..close];
            let value = self.value(name).ok_or_else(|| {
                pattern_error(
                    template,
                    &format!(
                        "unknown placeholder {{{name}}} (known: {})",
                        PLACEHOLDERS.join(", ")
                    ),
                )
            })?;
            let raw = value.to_string_lossy();
            let value = trim_trailing_separators(&raw);
            if escape {
                out.push_str(&Pattern::escape(value));
            } else {
                out.push_str(value);
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        if out.is_empty() && !template.is_empty() {
            // A bare `{root}` of `/` trims down to nothing.
            out.push(std::path::MAIN_SEPARATOR);
        }
        Ok(out)
    }
}

/// A pattern after placeholder expansion, resolved to concrete roots.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPattern {
    /// Existing paths the pattern names.
    pub roots: Vec<PathBuf>,
    /// Whether the template contained wildcards. A literal directory stands
    /// for its contents; a wildcard match stands for itself.
    pub wildcard: bool,
    /// Per-entry failures hit while matching (unreadable directories).
    pub errors: Vec<(PathBuf, String)>,
}

/// Whether a template (placeholders excluded) contains glob metacharacters.
#[must_use]
pub fn has_wildcard(template: &str) -> bool {
    let mut depth = 0usize;
    for ch in template.chars() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '*' | '?' | '[' if depth == 0 => return true,
            _ => {}
        }
    }
    false
}

/// Expand placeholders and resolve the pattern against the filesystem.
///
/// A pattern that matches nothing resolves to no roots; that is not an error.
pub fn resolve_pattern(template: &str, ctx: &PathContext) -> Result<ResolvedPattern> {
    let wildcard = has_wildcard(template);
    if !wildcard {
        let literal = PathBuf::from(ctx.expand(template, false)?);
        let roots = if literal.symlink_metadata().is_ok() {
            vec![literal]
        } else {
            Vec::new()
        };
        return Ok(ResolvedPattern {
            roots,
            wildcard,
            errors: Vec::new(),
        });
    }

    let expanded = ctx.expand(template, true)?;
    let options = MatchOptions {
        case_sensitive: !cfg!(windows),
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    let paths = glob::glob_with(&expanded, options)
        .map_err(|err| pattern_error(template, &err.to_string()))?;

    let mut resolved = ResolvedPattern {
        wildcard,
        ..ResolvedPattern::default()
    };
    for entry in paths {
        match entry {
            Ok(path) => resolved.roots.push(path),
            Err(err) => resolved
                .errors
                .push((err.path().to_path_buf(), err.error().to_string())),
        }
    }
    Ok(resolved)
}

fn trim_trailing_separators(value: &str) -> &str {
    value.trim_end_matches(['/', '\\'])
}

fn pattern_error(template: &str, details: &str) -> RclError {
    RclError::Pattern {
        pattern: template.to_string(),
        details: details.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{PathContext, has_wildcard, resolve_pattern, trim_trailing_separators};
    use std::fs;

    #[test]
    fn wildcard_detection_ignores_placeholders() {
        assert!(!has_wildcard("{temp}/cache"));
        assert!(has_wildcard("{users}/*/.cache"));
        assert!(has_wildcard("{root}/var/log/*.[0-9]"));
        assert!(!has_wildcard("{system_root}\\MEMORY.DMP"));
    }

    #[test]
    fn root_placeholder_does_not_double_separators() {
        let ctx = PathContext {
            root: "/".into(),
            ..PathContext::rooted_at(std::path::Path::new("/scratch"))
        };
        assert_eq!(
            ctx.expand("{root}/var/tmp", false).unwrap(),
            "/var/tmp".to_string()
        );
    }

    #[test]
    fn placeholder_values_lose_trailing_separators() {
        assert_eq!(trim_trailing_separators("/var/tmp//"), "/var/tmp");
        assert_eq!(trim_trailing_separators("C:\\Temp\\"), "C:\\Temp");
        assert_eq!(trim_trailing_separators("/"), "");

        let ctx = PathContext {
            temp: "/scratch/tmp/".into(),
            ..PathContext::rooted_at(std::path::Path::new("/scratch"))
        };
        assert_eq!(ctx.expand("{temp}/x", false).unwrap(), "/scratch/tmp/x");
    }

    #[test]
    fn unknown_placeholder_is_rejected() {
        let ctx = PathContext::rooted_at(std::path::Path::new("/scratch"));
        let err = ctx.expand("{windir}/Temp", false).unwrap_err();
        assert_eq!(err.code(), "RCL-1004");
        assert!(ctx.expand("{temp/oops", false).is_err());
    }

    #[test]
    fn escaped_values_match_literally() {
        let dir = tempfile::tempdir().unwrap();
        let odd = dir.path().join("with[brackets]");
        fs::create_dir_all(odd.join("tmp")).unwrap();
        fs::write(odd.join("tmp").join("a.log"), b"x").unwrap();

        let ctx = PathContext::rooted_at(&odd);
        let resolved = resolve_pattern("{temp}/*.log", &ctx).unwrap();
        assert_eq!(resolved.roots, vec![odd.join("tmp").join("a.log")]);
        assert!(resolved.wildcard);
    }

    #[test]
    fn missing_literal_resolves_to_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = PathContext::rooted_at(dir.path());
        let resolved = resolve_pattern("{root}/var/log/nginx", &ctx).unwrap();
        assert!(resolved.roots.is_empty());
        assert!(!resolved.wildcard);
    }

    #[test]
    fn star_matches_hidden_entries() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = PathContext::rooted_at(dir.path());
        fs::create_dir_all(&ctx.temp).unwrap();
        fs::write(ctx.temp.join(".hidden"), b"x").unwrap();
        let resolved = resolve_pattern("{temp}/*", &ctx).unwrap();
        assert_eq!(resolved.roots.len(), 1);
    }
}
