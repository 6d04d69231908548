//! Builders for the `hg` commands issued by a poll cycle.

use std::path::{Path, PathBuf};

use hgpoller_exec::platform::{LINE_SEP, PATH_SEP};
use hgpoller_exec::{Environment, Invocation};

/// Builds the invocations of one poll cycle.
///
/// All invocations share the program, working copy and environment snapshot
/// given at construction.
#[derive(Debug, Clone)]
pub struct HgCommands {
    program: String,
    workdir: PathBuf,
    env: Environment,
}

impl HgCommands {
    /// Creates a builder for `program` operating on `workdir`.
    pub fn new(program: impl Into<String>, workdir: impl Into<PathBuf>, env: Environment) -> Self {
        Self {
            program: program.into(),
            workdir: workdir.into(),
            env,
        }
    }

    /// Working copy the commands run in.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn base(&self) -> Invocation {
        Invocation::new(&self.program).env(self.env.clone())
    }

    fn in_workdir(&self) -> Invocation {
        self.base().current_dir(&self.workdir)
    }

    /// `hg init <workdir>`, run from the caller's directory.
    pub fn init(&self) -> Invocation {
        self.base()
            .arg("init")
            .arg(self.workdir.to_string_lossy())
    }

    /// `hg pull -b <branch>... -B <bookmark>... <repo>`.
    pub fn pull<'a>(
        &self,
        repo_url: &str,
        branches: impl IntoIterator<Item = &'a str>,
        bookmarks: impl IntoIterator<Item = &'a str>,
    ) -> Invocation {
        let mut inv = self.in_workdir().arg("pull");
        for branch in branches {
            inv = inv.args(["-b", branch]);
        }
        for bookmark in bookmarks {
            inv = inv.args(["-B", bookmark]);
        }
        inv.arg(repo_url)
    }

    /// `hg heads -r <branch>`, one revision number per line.
    pub fn heads(&self, branch: &str) -> Invocation {
        self.in_workdir()
            .args(["heads", "-r", branch])
            .arg(format!("--template={{rev}}{}", LINE_SEP))
    }

    /// `hg log -r <from>::<to>`, one `rev:node` per line.
    pub fn range(&self, from: &str, to: &str) -> Invocation {
        self.in_workdir()
            .args(["log", "-r"])
            .arg(format!("{}::{}", from, to))
            .arg("--template={rev}:{node}\\n")
    }

    /// `hg log -r <revision>` with date, author, files and description.
    pub fn detail(&self, revision: &str) -> Invocation {
        let template = format!(
            "--template={{date|hgdate}}{ls}{{author}}{ls}{{files % '{{file}}{ps}'}}{ls}{{desc|strip}}",
            ls = LINE_SEP,
            ps = PATH_SEP
        );
        self.in_workdir().args(["log", "-r", revision]).arg(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands() -> HgCommands {
        HgCommands::new("hg", "/some/dir", Environment::from_vars([("K", "V")]))
    }

    #[test]
    fn test_init_has_no_cwd() {
        let inv = commands().init();
        assert_eq!(inv.args, vec!["init", "/some/dir"]);
        assert_eq!(inv.workdir, None);
        assert_eq!(inv.env.get("K").and_then(|v| v.to_str()), Some("V"));
    }

    #[test]
    fn test_pull_branches_and_bookmarks() {
        let inv = commands().pull("ssh://example.com/foo/baz", ["default", "stable"], ["@"]);
        assert_eq!(
            inv.args,
            vec![
                "pull",
                "-b",
                "default",
                "-b",
                "stable",
                "-B",
                "@",
                "ssh://example.com/foo/baz"
            ]
        );
        assert_eq!(inv.workdir, Some(PathBuf::from("/some/dir")));
    }

    #[test]
    fn test_heads_template() {
        let inv = commands().heads("default");
        assert_eq!(
            inv.args,
            vec![
                "heads".to_string(),
                "-r".to_string(),
                "default".to_string(),
                format!("--template={{rev}}{}", LINE_SEP),
            ]
        );
    }

    #[test]
    fn test_range_template() {
        let inv = commands().range("4", "5");
        assert_eq!(inv.args, vec!["log", "-r", "4::5", "--template={rev}:{node}\\n"]);
    }

    #[test]
    fn test_detail_template() {
        let inv = commands().detail("784bd");
        let expected = format!(
            "--template={{date|hgdate}}{ls}{{author}}{ls}{{files % '{{file}}{ps}'}}{ls}{{desc|strip}}",
            ls = LINE_SEP,
            ps = PATH_SEP
        );
        assert_eq!(inv.args[..3], ["log", "-r", "784bd"]);
        assert_eq!(inv.args[3], expected);
        assert_eq!(inv.workdir, Some(PathBuf::from("/some/dir")));
    }
}
