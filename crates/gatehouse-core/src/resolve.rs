//! Deterministic merge-conflict resolution.
//!
//! Invoked only when a direct merge cannot complete on its own. Each
//! conflicted file is resolved by a fixed rule table: dependency-lock
//! files always keep the integration branch's version, everything else
//! takes the incoming branch's version. Files whose resolution cannot be
//! staged (for example one side deleted the file) are reported back as
//! unresolved; the caller must treat that as a terminal failure for the
//! attempt, not a silent success.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::git::{GitError, GitRepo, MergeSide};

/// Dependency-lock file basenames that always resolve to the integration
/// branch's version. Regenerating a lock file on the integration side is
/// cheaper than auditing an incoming one.
pub const LOCK_FILES: &[&str] = &[
    "Cargo.lock",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Gemfile.lock",
    "poetry.lock",
    "go.sum",
];

/// Per-file resolution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep the integration branch's version.
    KeepIntegration,
    /// Take the incoming branch's version.
    TakeIncoming,
}

impl ResolutionStrategy {
    const fn side(self) -> MergeSide {
        match self {
            Self::KeepIntegration => MergeSide::Ours,
            Self::TakeIncoming => MergeSide::Theirs,
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeepIntegration => write!(f, "keep-integration"),
            Self::TakeIncoming => write!(f, "take-incoming"),
        }
    }
}

/// The rule table: which strategy applies to a conflicted path.
#[must_use]
pub fn strategy_for(path: &str) -> ResolutionStrategy {
    let basename = path.rsplit('/').next().unwrap_or(path);
    if LOCK_FILES.contains(&basename) {
        ResolutionStrategy::KeepIntegration
    } else {
        ResolutionStrategy::TakeIncoming
    }
}

/// One successfully staged resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Conflicted path.
    pub path: String,
    /// Strategy that was applied.
    pub strategy: ResolutionStrategy,
}

/// Outcome of a conflict-resolution pass.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolution {
    /// Files staged by the rule table.
    pub resolved: Vec<ResolvedFile>,
    /// Files requiring manual intervention.
    pub unresolved: Vec<String>,
}

impl ConflictResolution {
    /// True when every conflicted file was staged.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Errors from conflict resolution.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// The underlying VCS operation failed.
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Apply the rule table to every conflicted file, staging resolutions.
///
/// The merge is expected to be in progress (after a failed
/// [`GitRepo::merge_no_commit`]). Files that cannot be staged are
/// collected as unresolved rather than failing the pass.
///
/// # Errors
///
/// Returns an error only if git itself cannot be executed.
pub fn resolve_conflicts(
    repo: &GitRepo,
    conflicted: &[String],
) -> Result<ConflictResolution, ResolveError> {
    let mut outcome = ConflictResolution::default();
    for path in conflicted {
        let strategy = strategy_for(path);
        if repo.take_conflict_side(path, strategy.side())? {
            debug!(target: "gatehouse::resolve", path, %strategy, "staged resolution");
            outcome.resolved.push(ResolvedFile {
                path: path.clone(),
                strategy,
            });
        } else {
            warn!(target: "gatehouse::resolve", path, "cannot stage resolution, manual intervention required");
            outcome.unresolved.push(path.clone());
        }
    }
    Ok(outcome)
}

/// Finalize a fully resolved merge with a synthetic merge commit that
/// records the source branch.
///
/// # Errors
///
/// Returns an error if the commit fails.
pub fn finalize_merge(repo: &GitRepo, source_branch: &str) -> Result<(), ResolveError> {
    let message = format!("Merge branch '{source_branch}' (conflicts auto-resolved)");
    repo.commit(&message)?;
    Ok(())
}
