//! Locations of hgpoller's state and configuration.
//!
//! # Storage Structure
//!
//! All application data is stored under `~/.hgpoller/`:
//!
//! ```text
//! ~/.hgpoller/
//! ├── config/
//! │   ├── sources.json      # Polled repositories
//! │   └── .env.local        # Extra environment for hg (optional)
//! ├── state/
//! │   └── revisions/        # Last confirmed head per branch, one file per source,
//! │                         # plus a lock file while a process works on it
//! ├── changes/
//! │   ├── changes.jsonl     # Emitted changes
//! │   └── changes.jsonl.lock # Held during an append
//! └── work/                 # Default parent of relative working copies
//! ```
//!
//! # Environment Variables
//!
//! - `HGPOLLER_STATE_DIR`: Override the base state directory
//! - `HGPOLLER_CONFIG_DIR`: Override the config directory
//! - `HGPOLLER_WORK_DIR`: Override the working copy directory

use std::path::{Path, PathBuf};

use hgpoller_models::SourceId;

/// Environment variable for custom state directory.
pub const STATE_DIR_ENV: &str = "HGPOLLER_STATE_DIR";

/// Environment variable for custom config directory.
pub const CONFIG_DIR_ENV: &str = "HGPOLLER_CONFIG_DIR";

/// Environment variable for custom working copy directory.
pub const WORK_DIR_ENV: &str = "HGPOLLER_WORK_DIR";

/// Default state directory name under home.
const DEFAULT_STATE_DIR: &str = ".hgpoller";

// Subdirectory names
const CONFIG_SUBDIR: &str = "config";
const STATE_SUBDIR: &str = "state";
const REVISIONS_SUBDIR: &str = "revisions";
const CHANGES_SUBDIR: &str = "changes";
const WORK_SUBDIR: &str = "work";

/// Resolved hgpoller directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    base: PathBuf,
    config: PathBuf,
    work: PathBuf,
}

impl Paths {
    /// Lays out every directory under `base`.
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            config: base.join(CONFIG_SUBDIR),
            work: base.join(WORK_SUBDIR),
            base,
        }
    }

    /// Resolves directories from the environment.
    ///
    /// The base directory is determined by:
    /// 1. `HGPOLLER_STATE_DIR` if set
    /// 2. `~/.hgpoller` if the home directory is known
    /// 3. `.hgpoller` in the current directory as fallback
    pub fn from_env() -> Self {
        let base = std::env::var(STATE_DIR_ENV)
            .map(|dir| expand(&dir))
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|h| h.join(DEFAULT_STATE_DIR))
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
            });
        let mut paths = Self::new(base);
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            paths.config = expand(&dir);
        }
        if let Ok(dir) = std::env::var(WORK_DIR_ENV) {
            paths.work = expand(&dir);
        }
        paths
    }

    /// Base state directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Config directory.
    pub fn config_dir(&self) -> &Path {
        &self.config
    }

    /// Parent of relative working copies.
    pub fn work_dir(&self) -> &Path {
        &self.work
    }

    /// File listing the polled sources.
    pub fn sources_file(&self) -> PathBuf {
        self.config.join("sources.json")
    }

    /// Optional dotenv file loaded at startup.
    pub fn env_file(&self) -> PathBuf {
        self.config.join(".env.local")
    }

    /// Directory of revision pointer files.
    pub fn revisions_dir(&self) -> PathBuf {
        self.base.join(STATE_SUBDIR).join(REVISIONS_SUBDIR)
    }

    /// Revision pointer file of one source.
    pub fn revision_file(&self, source: &SourceId) -> PathBuf {
        self.revisions_dir().join(format!("{}.json", source))
    }

    /// Lock held by the process polling or resetting one source.
    pub fn source_lock_file(&self, source: &SourceId) -> PathBuf {
        self.revisions_dir().join(format!("{}.lock", source))
    }

    /// The change log.
    pub fn change_log_file(&self) -> PathBuf {
        self.base.join(CHANGES_SUBDIR).join("changes.jsonl")
    }

    /// Resolves a configured working copy path.
    ///
    /// `~` is expanded; relative paths are taken relative to the work
    /// directory.
    pub fn resolve_workdir(&self, workdir: &Path) -> PathBuf {
        let expanded = expand(&workdir.to_string_lossy());
        if expanded.is_absolute() {
            expanded
        } else {
            self.work.join(expanded)
        }
    }

    /// Loads `config/.env.local` into the process environment, if present.
    ///
    /// Commands inherit the process environment, so variables defined
    /// there (`HGRCPATH`, proxies, ...) reach every `hg` invocation.
    pub fn load_env_file(&self) -> bool {
        let path = self.env_file();
        path.exists() && dotenvy::from_path(&path).is_ok()
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::from_env()
    }
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = Paths::new("/srv/hgpoller");

        assert_eq!(paths.config_dir(), Path::new("/srv/hgpoller/config"));
        assert_eq!(paths.work_dir(), Path::new("/srv/hgpoller/work"));
        assert_eq!(
            paths.sources_file(),
            PathBuf::from("/srv/hgpoller/config/sources.json")
        );
        assert_eq!(
            paths.change_log_file(),
            PathBuf::from("/srv/hgpoller/changes/changes.jsonl")
        );
    }

    #[test]
    fn test_revision_file_per_source() {
        let paths = Paths::new("/srv/hgpoller");
        let id = SourceId::from_name("ssh://example.com/foo/baz");

        assert_eq!(
            paths.revision_file(&id),
            PathBuf::from("/srv/hgpoller/state/revisions/ssh-example.com-foo-baz.json")
        );
        assert_eq!(
            paths.source_lock_file(&id),
            PathBuf::from("/srv/hgpoller/state/revisions/ssh-example.com-foo-baz.lock")
        );
    }

    #[test]
    fn test_resolve_workdir() {
        let paths = Paths::new("/srv/hgpoller");

        assert_eq!(
            paths.resolve_workdir(Path::new("/some/dir")),
            PathBuf::from("/some/dir")
        );
        assert_eq!(
            paths.resolve_workdir(Path::new("foo")),
            PathBuf::from("/srv/hgpoller/work/foo")
        );
    }

    #[test]
    fn test_resolve_workdir_expands_home() {
        let paths = Paths::new("/srv/hgpoller");
        let resolved = paths.resolve_workdir(Path::new("~/mirror"));

        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolved, home.join("mirror"));
        }
    }

    #[test]
    fn test_load_env_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!Paths::new(dir.path()).load_env_file());
    }
}
