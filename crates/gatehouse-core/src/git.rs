//! Blocking git command wrapper.
//!
//! All VCS access goes through [`GitRepo`], a thin wrapper over the `git`
//! binary. Calls are blocking: the orchestrator does not proceed to the
//! next state until the current command exits. Failures carry the command
//! line and captured stderr so callers can surface them with context.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, warn};

/// Errors from git operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GitError {
    /// The working directory is not inside a git repository.
    #[error("not a git repository: {path}")]
    NotARepository {
        /// Path that was checked.
        path: String,
    },

    /// A git command exited unsuccessfully.
    #[error("git {command} failed ({status}): {stderr}")]
    CommandFailed {
        /// The subcommand and arguments that were run.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured stderr, trimmed.
        stderr: String,
    },

    /// Command output was not valid UTF-8.
    #[error("git {command} produced non-UTF-8 output")]
    NonUtf8Output {
        /// The subcommand and arguments that were run.
        command: String,
    },

    /// Failed to spawn the git process at all.
    #[error("failed to execute git: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of a merge attempt that stops short of committing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The merge applied cleanly; the index holds the merged tree and
    /// awaits a commit.
    Clean,
    /// The merge stopped on conflicts in the listed files.
    Conflicted(Vec<String>),
}

/// Which side of a conflicted file to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeSide {
    /// The current (integration) branch's version.
    Ours,
    /// The incoming branch's version.
    Theirs,
}

impl MergeSide {
    const fn flag(self) -> &'static str {
        match self {
            Self::Ours => "--ours",
            Self::Theirs => "--theirs",
        }
    }
}

/// A handle to a local git repository.
#[derive(Debug, Clone)]
pub struct GitRepo {
    workdir: PathBuf,
}

impl GitRepo {
    /// Open the repository containing `workdir`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::NotARepository`] if `workdir` is not inside a
    /// git repository, or [`GitError::Io`] if git cannot be executed.
    pub fn open(workdir: &Path) -> Result<Self, GitError> {
        let repo = Self {
            workdir: workdir.to_path_buf(),
        };
        let output = repo.git(&["rev-parse", "--git-dir"])?;
        if !output.status.success() {
            return Err(GitError::NotARepository {
                path: workdir.display().to_string(),
            });
        }
        Ok(repo)
    }

    /// The repository working directory this handle operates in.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn git(&self, args: &[&str]) -> Result<Output, GitError> {
        debug!(target: "gatehouse::git", ?args, "running git");
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(GitError::Io)
    }

    /// Run a git command, requiring success; returns trimmed stdout.
    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.git(args)?;
        if !output.status.success() {
            return Err(command_failed(args, &output));
        }
        let stdout = String::from_utf8(output.stdout).map_err(|_| GitError::NonUtf8Output {
            command: args.join(" "),
        })?;
        Ok(stdout.trim().to_string())
    }

    /// Run a git command, returning only whether it succeeded.
    fn run_ok(&self, args: &[&str]) -> Result<bool, GitError> {
        Ok(self.git(args)?.status.success())
    }

    /// Name of the currently checked-out branch.
    ///
    /// # Errors
    ///
    /// Returns an error if HEAD cannot be resolved (e.g. unborn branch).
    pub fn current_branch(&self) -> Result<String, GitError> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Resolve a revision to its commit id.
    ///
    /// # Errors
    ///
    /// Returns an error if the revision does not resolve.
    pub fn rev_parse(&self, rev: &str) -> Result<String, GitError> {
        self.run(&["rev-parse", "--verify", rev])
    }

    /// Returns true if a local branch with this name exists.
    ///
    /// # Errors
    ///
    /// Returns an error only if git itself cannot be executed.
    pub fn branch_exists(&self, branch: &str) -> Result<bool, GitError> {
        let refname = format!("refs/heads/{branch}");
        self.run_ok(&["rev-parse", "--verify", "--quiet", &refname])
    }

    /// List all local branch names.
    ///
    /// # Errors
    ///
    /// Returns an error if the ref listing fails.
    pub fn list_branches(&self) -> Result<Vec<String>, GitError> {
        let out = self.run(&[
            "for-each-ref",
            "--format=%(refname:short)",
            "refs/heads",
        ])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    /// Merge base of two revisions.
    ///
    /// # Errors
    ///
    /// Returns an error if the revisions have no common ancestor or do
    /// not resolve.
    pub fn merge_base(&self, a: &str, b: &str) -> Result<String, GitError> {
        self.run(&["merge-base", a, b])
    }

    /// Returns true if `ancestor` is an ancestor of `descendant`.
    ///
    /// # Errors
    ///
    /// Returns an error only if git itself cannot be executed.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        self.run_ok(&["merge-base", "--is-ancestor", ancestor, descendant])
    }

    /// Files changed on `branch` relative to its merge base with `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge base or diff cannot be computed.
    pub fn changed_files(&self, target: &str, branch: &str) -> Result<Vec<String>, GitError> {
        let base = self.merge_base(target, branch)?;
        let out = self.run(&["diff", "--name-only", &base, branch])?;
        Ok(out
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Non-destructive three-way merge probe between `target` and
    /// `candidate`. Returns true if the probe reports irreconcilable
    /// hunks. Neither the working tree nor any ref is touched.
    ///
    /// Uses `git merge-tree --write-tree` where available and falls back
    /// to the legacy three-argument `merge-tree` on older git versions.
    ///
    /// # Errors
    ///
    /// Returns an error if both probe forms fail to run.
    pub fn merge_probe(&self, target: &str, candidate: &str) -> Result<bool, GitError> {
        let args = ["merge-tree", "--write-tree", target, candidate];
        let output = self.git(&args)?;
        match output.status.code() {
            Some(0) => return Ok(false),
            Some(1) => return Ok(true),
            _ => {
                warn!(
                    target: "gatehouse::git",
                    "merge-tree --write-tree unavailable, falling back to legacy probe"
                );
            }
        }

        // Legacy form prints the merged content with conflict markers.
        let base = self.merge_base(target, candidate)?;
        let out = self.run(&["merge-tree", &base, target, candidate])?;
        Ok(out.contains("<<<<<<<") || out.contains("changed in both"))
    }

    /// Check out a branch.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkout fails (dirty tree, missing ref).
    pub fn checkout(&self, branch: &str) -> Result<(), GitError> {
        self.run(&["checkout", branch]).map(drop)
    }

    /// Create a branch at `start_point` and check it out.
    ///
    /// # Errors
    ///
    /// Returns an error if the branch already exists or the start point
    /// does not resolve.
    pub fn create_branch(&self, name: &str, start_point: &str) -> Result<(), GitError> {
        self.run(&["checkout", "-b", name, start_point]).map(drop)
    }

    /// Attempt to merge `branch` into the current branch without
    /// committing and without fast-forwarding.
    ///
    /// On conflict the merge is left in progress so the caller can stage
    /// per-file resolutions; resolve or call [`GitRepo::merge_abort`].
    ///
    /// # Errors
    ///
    /// Returns an error if the merge fails for a reason other than
    /// content conflicts.
    pub fn merge_no_commit(&self, branch: &str) -> Result<MergeOutcome, GitError> {
        let args = ["merge", "--no-commit", "--no-ff", branch];
        let output = self.git(&args)?;
        if output.status.success() {
            return Ok(MergeOutcome::Clean);
        }
        let conflicted = self.conflicted_files()?;
        if conflicted.is_empty() {
            // Merge failed outright (unrelated histories, dirty tree, ...).
            return Err(command_failed(&args, &output));
        }
        Ok(MergeOutcome::Conflicted(conflicted))
    }

    /// Paths currently in the unmerged (conflicted) index state.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    pub fn conflicted_files(&self) -> Result<Vec<String>, GitError> {
        let out = self.run(&["diff", "--name-only", "--diff-filter=U"])?;
        Ok(out
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Stage one side of a conflicted file. Returns false if that side
    /// cannot be checked out (e.g. the file was deleted on that side),
    /// leaving the path unresolved.
    ///
    /// # Errors
    ///
    /// Returns an error only if git itself cannot be executed.
    pub fn take_conflict_side(&self, path: &str, side: MergeSide) -> Result<bool, GitError> {
        if !self.run_ok(&["checkout", side.flag(), "--", path])? {
            return Ok(false);
        }
        self.run_ok(&["add", "--", path])
    }

    /// Commit the staged state (used to finalize a `--no-commit` merge).
    ///
    /// # Errors
    ///
    /// Returns an error if there is nothing to commit or the commit fails.
    pub fn commit(&self, message: &str) -> Result<(), GitError> {
        self.run(&["commit", "--no-edit", "-m", message]).map(drop)
    }

    /// Merge `branch` into the current branch, fast-forwarding when
    /// possible.
    ///
    /// # Errors
    ///
    /// Returns an error if the merge does not apply cleanly.
    pub fn merge(&self, branch: &str) -> Result<(), GitError> {
        self.run(&["merge", "--no-edit", branch]).map(drop)
    }

    /// Abort an in-progress merge, restoring the pre-merge tree. A no-op
    /// failure (no merge in progress) is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error only if git itself cannot be executed.
    pub fn merge_abort(&self) -> Result<(), GitError> {
        let _ = self.run_ok(&["merge", "--abort"])?;
        Ok(())
    }

    /// Hard-reset the current branch to `rev`.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset_hard(&self, rev: &str) -> Result<(), GitError> {
        self.run(&["reset", "--hard", rev]).map(drop)
    }

    /// Returns true if the named remote is configured.
    ///
    /// # Errors
    ///
    /// Returns an error only if git itself cannot be executed.
    pub fn has_remote(&self, remote: &str) -> Result<bool, GitError> {
        self.run_ok(&["remote", "get-url", remote])
    }

    /// Push a branch to a remote.
    ///
    /// # Errors
    ///
    /// Returns an error if the push is rejected or the remote is
    /// unreachable.
    pub fn push(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        self.run(&["push", remote, branch]).map(drop)
    }

    /// Delete a local branch (forced; the branch is expected to be
    /// merged already).
    ///
    /// # Errors
    ///
    /// Returns an error if the branch cannot be deleted.
    pub fn delete_branch(&self, branch: &str) -> Result<(), GitError> {
        self.run(&["branch", "-D", branch]).map(drop)
    }
}

fn command_failed(args: &[&str], output: &Output) -> GitError {
    GitError::CommandFailed {
        command: args.join(" "),
        status: output
            .status
            .code()
            .map_or_else(|| "killed by signal".to_string(), |c| format!("exit {c}")),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;

    fn sh(dir: &Path, args: &[&str]) {
        let status = Command::new(args[0])
            .args(&args[1..])
            .current_dir(dir)
            .status()
            .unwrap_or_else(|e| panic!("failed to run {args:?}: {e}"));
        assert!(status.success(), "command {args:?} failed");
    }

    fn scratch_repo() -> (TempDir, GitRepo) {
        let dir = TempDir::new().expect("tempdir");
        sh(dir.path(), &["git", "init", "-q"]);
        sh(dir.path(), &["git", "checkout", "-q", "-b", "main"]);
        sh(dir.path(), &["git", "config", "user.email", "test@test"]);
        sh(dir.path(), &["git", "config", "user.name", "test"]);
        fs::write(dir.path().join("README.md"), "readme\n").unwrap();
        sh(dir.path(), &["git", "add", "."]);
        sh(dir.path(), &["git", "commit", "-q", "-m", "initial"]);
        let repo = GitRepo::open(dir.path()).expect("open repo");
        (dir, repo)
    }

    #[test]
    fn test_open_rejects_non_repository() {
        let dir = TempDir::new().unwrap();
        let err = GitRepo::open(dir.path()).unwrap_err();
        assert!(matches!(err, GitError::NotARepository { .. }));
    }

    #[test]
    fn test_current_branch_and_rev_parse() {
        let (_dir, repo) = scratch_repo();
        assert_eq!(repo.current_branch().unwrap(), "main");
        let head = repo.rev_parse("HEAD").unwrap();
        assert_eq!(head.len(), 40);
    }

    #[test]
    fn test_branch_listing_and_existence() {
        let (dir, repo) = scratch_repo();
        sh(dir.path(), &["git", "branch", "feature/a"]);
        assert!(repo.branch_exists("feature/a").unwrap());
        assert!(!repo.branch_exists("feature/missing").unwrap());
        let branches = repo.list_branches().unwrap();
        assert!(branches.contains(&"main".to_string()));
        assert!(branches.contains(&"feature/a".to_string()));
    }

    #[test]
    fn test_changed_files_relative_to_merge_base() {
        let (dir, repo) = scratch_repo();
        sh(dir.path(), &["git", "checkout", "-q", "-b", "topic"]);
        fs::write(dir.path().join("new.txt"), "new\n").unwrap();
        sh(dir.path(), &["git", "add", "."]);
        sh(dir.path(), &["git", "commit", "-q", "-m", "add new"]);
        // Advance main independently; the diff must stay merge-base
        // relative and not pick up main's file.
        sh(dir.path(), &["git", "checkout", "-q", "main"]);
        fs::write(dir.path().join("main-only.txt"), "m\n").unwrap();
        sh(dir.path(), &["git", "add", "."]);
        sh(dir.path(), &["git", "commit", "-q", "-m", "main moves on"]);

        let changed = repo.changed_files("main", "topic").unwrap();
        assert_eq!(changed, vec!["new.txt".to_string()]);
    }

    #[test]
    fn test_merge_probe_detects_conflicts() {
        let (dir, repo) = scratch_repo();
        sh(dir.path(), &["git", "checkout", "-q", "-b", "left"]);
        fs::write(dir.path().join("README.md"), "left\n").unwrap();
        sh(dir.path(), &["git", "commit", "-q", "-am", "left"]);
        sh(dir.path(), &["git", "checkout", "-q", "main"]);
        fs::write(dir.path().join("README.md"), "right\n").unwrap();
        sh(dir.path(), &["git", "commit", "-q", "-am", "right"]);

        assert!(repo.merge_probe("main", "left").unwrap());
    }

    #[test]
    fn test_merge_probe_clean_branches() {
        let (dir, repo) = scratch_repo();
        sh(dir.path(), &["git", "checkout", "-q", "-b", "clean"]);
        fs::write(dir.path().join("other.txt"), "x\n").unwrap();
        sh(dir.path(), &["git", "add", "."]);
        sh(dir.path(), &["git", "commit", "-q", "-m", "clean change"]);
        sh(dir.path(), &["git", "checkout", "-q", "main"]);

        assert!(!repo.merge_probe("main", "clean").unwrap());
    }

    #[test]
    fn test_merge_no_commit_clean_then_commit() {
        let (dir, repo) = scratch_repo();
        sh(dir.path(), &["git", "checkout", "-q", "-b", "feature"]);
        fs::write(dir.path().join("feature.txt"), "f\n").unwrap();
        sh(dir.path(), &["git", "add", "."]);
        sh(dir.path(), &["git", "commit", "-q", "-m", "feature"]);
        sh(dir.path(), &["git", "checkout", "-q", "main"]);

        let outcome = repo.merge_no_commit("feature").unwrap();
        assert_eq!(outcome, MergeOutcome::Clean);
        repo.commit("merge feature").unwrap();
        assert!(dir.path().join("feature.txt").exists());
    }

    #[test]
    fn test_merge_no_commit_conflict_and_abort() {
        let (dir, repo) = scratch_repo();
        sh(dir.path(), &["git", "checkout", "-q", "-b", "conflicting"]);
        fs::write(dir.path().join("README.md"), "theirs\n").unwrap();
        sh(dir.path(), &["git", "commit", "-q", "-am", "theirs"]);
        sh(dir.path(), &["git", "checkout", "-q", "main"]);
        fs::write(dir.path().join("README.md"), "ours\n").unwrap();
        sh(dir.path(), &["git", "commit", "-q", "-am", "ours"]);

        let pre = repo.rev_parse("HEAD").unwrap();
        match repo.merge_no_commit("conflicting").unwrap() {
            MergeOutcome::Conflicted(files) => {
                assert_eq!(files, vec!["README.md".to_string()]);
            }
            MergeOutcome::Clean => panic!("expected conflicts"),
        }
        repo.merge_abort().unwrap();
        assert_eq!(repo.rev_parse("HEAD").unwrap(), pre);
        assert_eq!(fs::read_to_string(dir.path().join("README.md")).unwrap(), "ours\n");
    }

    #[test]
    fn test_take_conflict_side_theirs() {
        let (dir, repo) = scratch_repo();
        sh(dir.path(), &["git", "checkout", "-q", "-b", "incoming"]);
        fs::write(dir.path().join("README.md"), "incoming\n").unwrap();
        sh(dir.path(), &["git", "commit", "-q", "-am", "incoming"]);
        sh(dir.path(), &["git", "checkout", "-q", "main"]);
        fs::write(dir.path().join("README.md"), "integration\n").unwrap();
        sh(dir.path(), &["git", "commit", "-q", "-am", "integration"]);

        let outcome = repo.merge_no_commit("incoming").unwrap();
        assert!(matches!(outcome, MergeOutcome::Conflicted(_)));
        assert!(repo.take_conflict_side("README.md", MergeSide::Theirs).unwrap());
        assert!(repo.conflicted_files().unwrap().is_empty());
        repo.commit("merge incoming").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("README.md")).unwrap(),
            "incoming\n"
        );
    }

    #[test]
    fn test_reset_hard_restores_tip() {
        let (dir, repo) = scratch_repo();
        let pre = repo.rev_parse("HEAD").unwrap();
        fs::write(dir.path().join("scratch.txt"), "x\n").unwrap();
        sh(dir.path(), &["git", "add", "."]);
        sh(dir.path(), &["git", "commit", "-q", "-m", "scratch"]);
        assert_ne!(repo.rev_parse("HEAD").unwrap(), pre);
        repo.reset_hard(&pre).unwrap();
        assert_eq!(repo.rev_parse("HEAD").unwrap(), pre);
        assert!(!dir.path().join("scratch.txt").exists());
    }

    #[test]
    fn test_has_remote_false_for_scratch_repo() {
        let (_dir, repo) = scratch_repo();
        assert!(!repo.has_remote("origin").unwrap());
    }
}
