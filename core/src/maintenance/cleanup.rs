// Directory cleaners behind the clean_* maintenance phases

use crate::control::RunContext;
use crate::WipeResult;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions and file names a cleaner never deletes
const PROTECTED_SUFFIXES: &[&str] = &[
    ".exe",
    ".dll",
    ".sys",
    ".bat",
    ".cmd",
    "pagefile.sys",
    "hiberfil.sys",
    "swapfile.sys",
];

pub fn is_protected(path: &Path) -> bool {
    let lower = path.to_string_lossy().to_lowercase();
    PROTECTED_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

/// Directories each cleaning phase works on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleanupTargets {
    pub temp: Vec<PathBuf>,
    pub update_cache: Vec<PathBuf>,
    pub browsers: Vec<PathBuf>,
    /// Glob patterns expanded at clean time (per-profile browser caches)
    pub browser_globs: Vec<String>,
}

impl CleanupTargets {
    /// Platform directories for the current user
    pub fn platform_default() -> Self {
        let base = BaseDirs::new();
        let mut targets = Self {
            temp: vec![std::env::temp_dir()],
            ..Default::default()
        };

        if cfg!(windows) {
            let env_dir = |var: &str| std::env::var_os(var).map(PathBuf::from);
            let windir = env_dir("WINDIR").unwrap_or_else(|| PathBuf::from(r"C:\Windows"));
            let local = env_dir("LOCALAPPDATA");
            let roaming = env_dir("APPDATA");

            targets.temp.push(windir.join("Temp"));
            targets.temp.push(windir.join("Prefetch"));
            if let Some(local) = &local {
                targets.temp.push(local.join("Temp"));
            }

            targets.update_cache.push(windir.join("SoftwareDistribution").join("Download"));
            targets.update_cache.push(windir.join("SoftwareDistribution").join("DataStore"));

            if let Some(local) = &local {
                let chrome = local.join("Google").join("Chrome").join("User Data").join("Default");
                targets.browsers.push(chrome.join("Cache"));
                targets.browsers.push(chrome.join("Code Cache"));
                targets.browsers.push(
                    local.join("Microsoft").join("Edge").join("User Data").join("Default").join("Cache"),
                );
                targets.browsers.push(local.join("Microsoft").join("Windows").join("INetCache"));
                targets.browser_globs.push(
                    local
                        .join("Mozilla")
                        .join("Firefox")
                        .join("Profiles")
                        .join("*")
                        .join("cache2")
                        .to_string_lossy()
                        .into_owned(),
                );
            }
            if let Some(roaming) = &roaming {
                targets.browsers.push(roaming.join("Opera Software").join("Opera Stable").join("Cache"));
            }
        } else {
            targets.temp.push(PathBuf::from("/var/tmp"));
            targets.update_cache.extend(
                ["/var/cache/apt/archives", "/var/cache/pacman/pkg", "/var/cache/dnf"]
                    .iter()
                    .map(PathBuf::from),
            );

            if let Some(base) = &base {
                let cache = base.cache_dir();
                for browser in ["google-chrome", "chromium", "microsoft-edge", "BraveSoftware/Brave-Browser"] {
                    targets.browsers.push(cache.join(browser).join("Default").join("Cache"));
                }
                // ~/Library/Caches/Firefox on macOS, ~/.cache/mozilla/firefox elsewhere
                for firefox in ["mozilla/firefox", "Firefox/Profiles"] {
                    targets
                        .browser_globs
                        .push(cache.join(firefox).join("*").join("cache2").to_string_lossy().into_owned());
                }
            }
        }

        targets.temp.dedup();
        targets
    }

    /// Browser cache roots, with glob patterns expanded
    pub fn browser_roots(&self) -> Vec<PathBuf> {
        let mut roots = self.browsers.clone();
        for pattern in &self.browser_globs {
            match glob::glob(pattern) {
                Ok(paths) => roots.extend(paths.filter_map(Result::ok)),
                Err(e) => tracing::warn!(pattern = %pattern, error = %e, "Invalid cache pattern"),
            }
        }
        roots
    }
}

/// Totals of one cleaning run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSummary {
    pub files_removed: u64,
    pub bytes_removed: u64,
    pub files_skipped: u64,
    pub failures: u64,
}

/// Delete every unprotected file under `roots`.
///
/// Missing roots are ignored and files that cannot be removed are counted
/// as failures. In dry-run mode files are only counted.
pub fn clean_paths(roots: &[PathBuf], dry_run: bool, ctx: &RunContext) -> WipeResult<CleanupSummary> {
    let mut summary = CleanupSummary::default();

    for root in roots {
        if !root.is_dir() {
            tracing::debug!(path = %root.display(), "Cleanup root missing, skipping");
            continue;
        }

        for entry in WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            ctx.check()?;

            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if is_protected(path) {
                summary.files_skipped += 1;
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if dry_run {
                tracing::info!(path = %path.display(), size, "DRY RUN: would remove");
                summary.files_removed += 1;
                summary.bytes_removed += size;
                continue;
            }

            match fs::remove_file(path) {
                Ok(()) => {
                    summary.files_removed += 1;
                    summary.bytes_removed += size;
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "Could not remove file");
                    summary.failures += 1;
                }
            }
        }
    }

    tracing::info!(
        removed = summary.files_removed,
        cleaned_mb = summary.bytes_removed / (1024 * 1024),
        failures = summary.failures,
        "Cleanup finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::CancelToken;
    use test_case::test_case;

    #[test_case("setup.EXE", true)]
    #[test_case("driver.sys", true)]
    #[test_case("C:/pagefile.sys", true)]
    #[test_case("run.cmd", true)]
    #[test_case("cache.tmp", false)]
    #[test_case("notes.txt", false)]
    fn test_protected_files(path: &str, protected: bool) {
        assert_eq!(is_protected(Path::new(path)), protected);
    }

    fn populate(dir: &Path) {
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("a.tmp"), vec![1u8; 1000]).unwrap();
        fs::write(dir.join("nested").join("b.log"), vec![2u8; 24]).unwrap();
        fs::write(dir.join("tool.exe"), b"MZ").unwrap();
    }

    #[test]
    fn test_clean_removes_unprotected_files() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());

        let summary = clean_paths(
            &[dir.path().to_path_buf(), dir.path().join("missing")],
            false,
            &RunContext::unbounded(),
        )
        .unwrap();

        assert_eq!(summary.files_removed, 2);
        assert_eq!(summary.bytes_removed, 1024);
        assert_eq!(summary.files_skipped, 1);
        assert!(!dir.path().join("a.tmp").exists());
        assert!(dir.path().join("tool.exe").exists());
    }

    #[test]
    fn test_dry_run_keeps_files() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());

        let summary = clean_paths(&[dir.path().to_path_buf()], true, &RunContext::unbounded()).unwrap();
        assert_eq!(summary.files_removed, 2);
        assert!(dir.path().join("a.tmp").exists());
    }

    #[test]
    fn test_cancelled_clean_stops() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let token = CancelToken::new();
        token.cancel();

        let result = clean_paths(&[dir.path().to_path_buf()], false, &RunContext::new(token));
        assert!(result.is_err());
        assert!(dir.path().join("a.tmp").exists());
    }

    #[test]
    fn test_browser_globs_expand() {
        let dir = tempfile::tempdir().unwrap();
        for profile in ["abc.default", "xyz.work"] {
            fs::create_dir_all(dir.path().join(profile).join("cache2")).unwrap();
        }
        let targets = CleanupTargets {
            browser_globs: vec![dir.path().join("*").join("cache2").to_string_lossy().into_owned()],
            ..Default::default()
        };

        let mut roots = targets.browser_roots();
        roots.sort();
        assert_eq!(roots.len(), 2);
        assert!(roots[0].ends_with("abc.default/cache2"));
    }

    #[test]
    fn test_platform_default_includes_temp_dir() {
        let targets = CleanupTargets::platform_default();
        assert!(targets.temp.contains(&std::env::temp_dir()));
    }
}
