//! Definition of one polled repository.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hgpoller_models::SourceId;
use hgpoller_persistence::atomic::atomic_write_json;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default `hg` program name.
pub const DEFAULT_HG_BIN: &str = "hg";

/// Default branch polled when none is configured.
pub const DEFAULT_BRANCH: &str = "default";

/// Configuration of one polled repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Remote repository URL passed to `hg pull`.
    pub repo_url: String,

    /// Local working copy; relative paths live under the work directory.
    pub workdir: PathBuf,

    /// Named branches to poll.
    #[serde(default = "default_branches")]
    pub branches: Vec<String>,

    /// Bookmarks to poll.
    #[serde(default)]
    pub bookmarks: Vec<String>,

    /// Program used for every command.
    #[serde(default = "default_hg_bin")]
    pub hg_bin: String,

    /// Whether emitted changes carry the commit time.
    #[serde(default = "default_true")]
    pub use_timestamps: bool,

    /// Display name; the repository URL when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Project label attached to emitted changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Category label attached to emitted changes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Time between two scheduled polls.
    #[serde(default = "default_poll_interval", with = "duration_secs")]
    pub poll_interval: Duration,

    /// Poll once right after the scheduler starts.
    #[serde(default)]
    pub poll_at_launch: bool,

    /// Deadline of a single command.
    #[serde(default = "default_command_timeout", with = "duration_secs")]
    pub command_timeout: Duration,
}

fn default_branches() -> Vec<String> {
    vec![DEFAULT_BRANCH.to_string()]
}

fn default_hg_bin() -> String {
    DEFAULT_HG_BIN.to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_command_timeout() -> Duration {
    hgpoller_exec::DEFAULT_COMMAND_TIMEOUT
}

impl PollerConfig {
    /// Creates a config polling the `default` branch of `repo_url`.
    pub fn new(repo_url: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            repo_url: repo_url.into(),
            workdir: workdir.into(),
            branches: default_branches(),
            bookmarks: Vec::new(),
            hg_bin: default_hg_bin(),
            use_timestamps: true,
            name: None,
            project: None,
            category: None,
            poll_interval: default_poll_interval(),
            poll_at_launch: false,
            command_timeout: default_command_timeout(),
        }
    }

    /// Sets the polled branches.
    pub fn with_branches<I, S>(mut self, branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.branches = branches.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the polled bookmarks.
    pub fn with_bookmarks<I, S>(mut self, bookmarks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bookmarks = bookmarks.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the `hg` program.
    pub fn with_hg_bin(mut self, hg_bin: impl Into<String>) -> Self {
        self.hg_bin = hg_bin.into();
        self
    }

    /// Enables or disables commit timestamps.
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.use_timestamps = enabled;
        self
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the project label.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Sets the category label.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enables polling at launch.
    pub fn with_poll_at_launch(mut self, enabled: bool) -> Self {
        self.poll_at_launch = enabled;
        self
    }

    /// Sets the per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Display name of the source.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.repo_url)
    }

    /// Filesystem-safe id of the source.
    pub fn source_id(&self) -> SourceId {
        SourceId::from_name(self.name())
    }

    /// Branches followed by bookmarks, in the order they are polled.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.branches
            .iter()
            .chain(self.bookmarks.iter())
            .map(String::as_str)
    }

    /// One-line description of what is polled and where.
    pub fn describe(&self) -> String {
        let mut targets = Vec::new();
        if !self.branches.is_empty() {
            targets.push(format!("branches: {}", self.branches.join(", ")));
        }
        if !self.bookmarks.is_empty() {
            targets.push(format!("bookmarks: {}", self.bookmarks.join(", ")));
        }
        format!(
            "HgPoller watching the remote Mercurial repository {} with {}, {} in workdir {}",
            self.repo_url,
            self.hg_bin,
            targets.join("; "),
            self.workdir.display()
        )
    }

    /// Checks that the source can be polled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            name: self.name().to_string(),
            reason: reason.to_string(),
        };

        if self.repo_url.trim().is_empty() {
            return Err(invalid("repo_url is empty"));
        }
        if self.workdir.as_os_str().is_empty() {
            return Err(invalid("workdir is empty"));
        }
        if self.hg_bin.trim().is_empty() {
            return Err(invalid("hg_bin is empty"));
        }
        if self.branches.is_empty() && self.bookmarks.is_empty() {
            return Err(invalid("no branch or bookmark to poll"));
        }
        let mut seen = HashSet::new();
        for target in self.targets() {
            if target.trim().is_empty() {
                return Err(invalid("empty branch or bookmark name"));
            }
            if !seen.insert(target) {
                return Err(invalid(&format!("'{}' is listed twice", target)));
            }
        }
        if self.poll_interval.is_zero() {
            return Err(invalid("poll_interval must be positive"));
        }
        if self.command_timeout.is_zero() {
            return Err(invalid("command_timeout must be positive"));
        }
        Ok(())
    }
}

/// Loads and validates the sources file.
///
/// A missing file means no sources.
pub fn load_sources(path: &Path) -> Result<Vec<PollerConfig>, ConfigError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let sources: Vec<PollerConfig> =
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut ids = HashSet::new();
    for source in &sources {
        source.validate()?;
        if !ids.insert(source.source_id()) {
            return Err(ConfigError::Invalid {
                name: source.name().to_string(),
                reason: "another source has the same name".to_string(),
            });
        }
    }
    Ok(sources)
}

/// Writes the sources file atomically.
pub fn save_sources(path: &Path, sources: &[PollerConfig]) -> Result<(), ConfigError> {
    atomic_write_json(path, &sources)?;
    Ok(())
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = PollerConfig::new("ssh://example.com/foo/baz", "/some/dir");

        assert_eq!(config.hg_bin, "hg");
        assert_eq!(config.branches, vec!["default"]);
        assert!(config.bookmarks.is_empty());
        assert!(config.use_timestamps);
        assert_eq!(config.poll_interval, Duration::from_secs(600));
        assert!(!config.poll_at_launch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_name_defaults_to_repo_url() {
        let config = PollerConfig::new("ssh://example.com/foo/baz", "/some/dir");
        assert_eq!(config.name(), "ssh://example.com/foo/baz");

        let named = config.with_name("MyName");
        assert_eq!(named.name(), "MyName");
        assert_eq!(named.source_id().as_str(), "MyName");
    }

    #[test]
    fn test_describe() {
        let config = PollerConfig::new("ssh://example.com/foo/baz", "/some/dir")
            .with_bookmarks(["@"]);
        let description = config.describe();

        assert!(description.contains("HgPoller"));
        assert!(description.contains("ssh://example.com/foo/baz"));
        assert!(description.contains("branches: default"));
        assert!(description.contains("bookmarks: @"));
        assert!(description.contains("/some/dir"));
    }

    #[test]
    fn test_targets_order() {
        let config = PollerConfig::new("repo", "w")
            .with_branches(["default", "stable"])
            .with_bookmarks(["@"]);
        let targets: Vec<_> = config.targets().collect();
        assert_eq!(targets, vec!["default", "stable", "@"]);
    }

    #[test]
    fn test_validate_rejects_duplicates_and_empties() {
        let dup = PollerConfig::new("repo", "w").with_branches(["default", "default"]);
        assert!(dup.validate().is_err());

        let none = PollerConfig::new("repo", "w").with_branches(Vec::<String>::new());
        assert!(none.validate().is_err());

        let no_url = PollerConfig::new("  ", "w");
        assert!(no_url.validate().is_err());

        let zero = PollerConfig::new("repo", "w").with_poll_interval(Duration::ZERO);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_load_sources_applies_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sources.json");
        fs::write(
            &path,
            r#"[
                {"repo_url": "ssh://example.com/foo/baz", "workdir": "foo"},
                {"repo_url": "https://hg.example.org/bar", "workdir": "/srv/bar",
                 "branches": ["stable"], "use_timestamps": false, "poll_interval": 30,
                 "project": "bar"}
            ]"#,
        )
        .unwrap();

        let sources = load_sources(&path).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].branches, vec!["default"]);
        assert_eq!(sources[0].hg_bin, "hg");
        assert!(sources[0].use_timestamps);
        assert_eq!(sources[1].branches, vec!["stable"]);
        assert!(!sources[1].use_timestamps);
        assert_eq!(sources[1].poll_interval, Duration::from_secs(30));
        assert_eq!(sources[1].project.as_deref(), Some("bar"));
    }

    #[test]
    fn test_load_sources_missing_file() {
        let dir = tempdir().unwrap();
        assert!(load_sources(&dir.path().join("none.json")).unwrap().is_empty());
    }

    #[test]
    fn test_load_sources_rejects_same_name() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sources.json");
        let sources = vec![
            PollerConfig::new("repo", "a"),
            PollerConfig::new("repo", "b"),
        ];
        save_sources(&path, &sources).unwrap();

        assert!(matches!(
            load_sources(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config/sources.json");
        let sources = vec![PollerConfig::new("repo", "a")
            .with_bookmarks(["@"])
            .with_category("ci")
            .with_command_timeout(Duration::from_secs(60))];

        save_sources(&path, &sources).unwrap();
        assert_eq!(load_sources(&path).unwrap(), sources);
    }
}
