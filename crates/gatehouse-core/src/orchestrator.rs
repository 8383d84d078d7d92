//! Integration orchestration.
//!
//! Drives one reviewed branch through merge, conflict resolution,
//! validation, the push decision, and cleanup, persisting an
//! [`IntegrationRecord`] for every attempt, successful or failed, so
//! each attempt is auditable.
//!
//! # State machine
//!
//! ```text
//! PendingReview -> Reviewed -> Merging -> (ConflictResolution)? ->
//!     Validating -> DecidingPush -> {Integrated | FailedRolledBack}
//! ```
//!
//! The orchestrator is sequential: only one attempt may be in flight
//! against the shared integration branch, because merge and validation
//! operate on a single checked-out working tree. Concurrent invocations
//! serialize on the state store's advisory lock. Every external
//! operation is a blocking call; the orchestrator does not proceed until
//! the current step's process exits.
//!
//! # Failure semantics
//!
//! The tip of the integration branch is captured before the first
//! mutation. Every failure path aborts any in-progress merge and
//! hard-resets to that tip, so the repository is always either fully
//! merged-and-validated or exactly as it was. A failed attempt consumes
//! the branch's ledger entry: the branch must be re-reviewed before a
//! new attempt, preventing retry loops on a structurally broken branch.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::GatehouseConfig;
use crate::gate::{GateError, ValidationResult, Validator};
use crate::git::{GitError, GitRepo, MergeOutcome};
use crate::ledger::{IntegrationRecord, LedgerError, StateStore};
use crate::resolve::{finalize_merge, resolve_conflicts, ResolveError};

/// States an integration attempt moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationState {
    /// Branch exists but has no current review.
    PendingReview,
    /// A ledger entry exists; the branch is eligible for integration.
    Reviewed,
    /// Merging into the integration branch.
    Merging,
    /// The direct merge failed; per-file resolution is running.
    ConflictResolution,
    /// The validation gate is running against the merged tree.
    Validating,
    /// Deciding whether the result advances to the main line.
    DecidingPush,
    /// Terminal: the attempt succeeded.
    Integrated,
    /// Terminal: the attempt failed and the merge was undone.
    FailedRolledBack,
}

impl std::fmt::Display for IntegrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PendingReview => "PENDING_REVIEW",
            Self::Reviewed => "REVIEWED",
            Self::Merging => "MERGING",
            Self::ConflictResolution => "CONFLICT_RESOLUTION",
            Self::Validating => "VALIDATING",
            Self::DecidingPush => "DECIDING_PUSH",
            Self::Integrated => "INTEGRATED",
            Self::FailedRolledBack => "FAILED_ROLLED_BACK",
        };
        write!(f, "{name}")
    }
}

/// Per-attempt operator inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrateOptions {
    /// Confirm merging the integration branch into the main line when
    /// `automation.auto_push` is off.
    pub confirm_push: bool,

    /// Proceed past a failed gate. Only honored when the configuration
    /// enables `automation.override_on_validation_failure`.
    pub override_validation: bool,
}

/// The result of a completed attempt (terminal state reached).
#[derive(Debug, Clone)]
pub struct IntegrationOutcome {
    /// Terminal state: [`IntegrationState::Integrated`] or
    /// [`IntegrationState::FailedRolledBack`].
    pub state: IntegrationState,

    /// Every state the attempt moved through, in order.
    pub transitions: Vec<IntegrationState>,

    /// The history record appended for this attempt.
    pub record: IntegrationRecord,
}

impl IntegrationOutcome {
    /// True when the attempt reached [`IntegrationState::Integrated`].
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == IntegrationState::Integrated
    }
}

/// Errors that abort an attempt outright.
///
/// Failure *outcomes* (unresolved conflicts, failed validation) are not
/// errors: they conclude as [`IntegrationState::FailedRolledBack`] with a
/// record appended. Errors mean the attempt could not run or concluded
/// abnormally; the orchestrator rolls back before surfacing them.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum IntegrateError {
    /// The branch has no current ledger entry. Failed attempts consume
    /// the entry, so this is also the "no automatic retry" signal.
    #[error("branch '{branch}' has no current review; run review first")]
    ReviewRequired {
        /// Branch that was requested.
        branch: String,
    },

    /// The branch does not exist locally.
    #[error("branch '{branch}' not found")]
    BranchMissing {
        /// Branch that was requested.
        branch: String,
    },

    /// A VCS command failed unexpectedly.
    #[error(transparent)]
    Git(#[from] GitError),

    /// Ledger persistence failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The validation gate itself could not run.
    #[error(transparent)]
    Gate(#[from] GateError),
}

impl From<ResolveError> for IntegrateError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Git(git) => Self::Git(git),
        }
    }
}

/// Drives integration attempts against the shared integration branch.
pub struct IntegrationOrchestrator<'a> {
    repo: &'a GitRepo,
    config: &'a GatehouseConfig,
    store: &'a StateStore,
    validator: &'a dyn Validator,
}

impl<'a> IntegrationOrchestrator<'a> {
    /// Assemble an orchestrator over explicit components.
    #[must_use]
    pub const fn new(
        repo: &'a GitRepo,
        config: &'a GatehouseConfig,
        store: &'a StateStore,
        validator: &'a dyn Validator,
    ) -> Self {
        Self {
            repo,
            config,
            store,
            validator,
        }
    }

    /// Drive one attempt for `branch` to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`IntegrateError::ReviewRequired`] without touching the
    /// repository if the branch has no current review, and propagates
    /// VCS/ledger/gate process errors after rolling back. Failure
    /// outcomes are returned as [`IntegrationState::FailedRolledBack`],
    /// not as errors.
    pub fn integrate(
        &self,
        branch: &str,
        options: IntegrateOptions,
    ) -> Result<IntegrationOutcome, IntegrateError> {
        // Serialize attempts across threads and processes.
        let _lock = self.store.lock()?;

        let review = self
            .store
            .review_for(branch)?
            .ok_or_else(|| IntegrateError::ReviewRequired {
                branch: branch.to_string(),
            })?;
        if !self.repo.branch_exists(branch)? {
            return Err(IntegrateError::BranchMissing {
                branch: branch.to_string(),
            });
        }

        let mut transitions = vec![IntegrationState::Reviewed];
        let integration_branch = &self.config.integration_branch;
        let pre_tip = self.repo.rev_parse(integration_branch)?;
        self.repo.checkout(integration_branch)?;
        info!(
            target: "gatehouse::orchestrator",
            branch,
            integration_branch,
            pre_tip,
            "starting integration attempt"
        );

        transitions.push(IntegrationState::Merging);
        match self.repo.merge_no_commit(branch) {
            Ok(MergeOutcome::Clean) => {
                if let Err(err) = self.repo.commit(&format!("Integrate branch '{branch}'")) {
                    self.rollback(&pre_tip)?;
                    return Err(err.into());
                }
            }
            Ok(MergeOutcome::Conflicted(conflicted)) => {
                transitions.push(IntegrationState::ConflictResolution);
                info!(
                    target: "gatehouse::orchestrator",
                    branch,
                    conflicts = conflicted.len(),
                    "direct merge failed, resolving"
                );
                let resolution = match resolve_conflicts(self.repo, &conflicted) {
                    Ok(resolution) => resolution,
                    Err(err) => {
                        self.rollback(&pre_tip)?;
                        return Err(err.into());
                    }
                };
                if !resolution.is_complete() {
                    warn!(
                        target: "gatehouse::orchestrator",
                        branch,
                        unresolved = resolution.unresolved.len(),
                        "unresolved conflicts, rolling back"
                    );
                    self.rollback(&pre_tip)?;
                    let validation = ValidationResult::failure(format!(
                        "merge: unresolved conflicts require manual intervention: {}",
                        resolution.unresolved.join(", ")
                    ));
                    return self.conclude(
                        branch,
                        transitions,
                        IntegrationState::FailedRolledBack,
                        validation,
                        review.changed_files.len(),
                        false,
                    );
                }
                if let Err(err) = finalize_merge(self.repo, branch) {
                    self.rollback(&pre_tip)?;
                    return Err(err.into());
                }
            }
            Err(err) => {
                self.rollback(&pre_tip)?;
                return Err(err.into());
            }
        }

        transitions.push(IntegrationState::Validating);
        let validation = match self
            .validator
            .validate(self.repo.workdir(), &review.changed_files)
        {
            Ok(validation) => validation,
            Err(err) => {
                self.rollback(&pre_tip)?;
                return Err(err.into());
            }
        };

        let override_active =
            options.override_validation && self.config.automation.override_on_validation_failure;
        if !validation.passed && !override_active {
            info!(
                target: "gatehouse::orchestrator",
                branch,
                "validation failed, rolling back"
            );
            self.rollback(&pre_tip)?;
            return self.conclude(
                branch,
                transitions,
                IntegrationState::FailedRolledBack,
                validation,
                review.changed_files.len(),
                false,
            );
        }
        if !validation.passed {
            warn!(
                target: "gatehouse::orchestrator",
                branch,
                "validation failed but override is enabled, proceeding"
            );
        }

        transitions.push(IntegrationState::DecidingPush);
        let push_requested = self.config.automation.auto_push || options.confirm_push;
        let mut pushed_to_main = false;
        if push_requested {
            match self.advance_main() {
                Ok(()) => pushed_to_main = true,
                Err(err) => {
                    // Main was restored by advance_main; undo the
                    // integration merge as well before surfacing.
                    self.rollback(&pre_tip)?;
                    return Err(err);
                }
            }

            // Cleanup is strictly gated on "push succeeded AND
            // auto-delete enabled". Deletion failure does not fail an
            // otherwise complete attempt.
            if self.config.automation.auto_delete_merged_branch {
                if let Err(err) = self.repo.delete_branch(branch) {
                    warn!(
                        target: "gatehouse::orchestrator",
                        branch,
                        error = %err,
                        "failed to delete merged branch"
                    );
                }
            }
        }

        self.conclude(
            branch,
            transitions,
            IntegrationState::Integrated,
            validation,
            review.changed_files.len(),
            pushed_to_main,
        )
    }

    /// Merge the integration branch into the main line and push it when
    /// a remote is configured. On any failure the main branch is
    /// restored to its previous tip before the error is returned.
    fn advance_main(&self) -> Result<(), IntegrateError> {
        let main_branch = &self.config.main_branch;
        let main_tip = self.repo.rev_parse(main_branch)?;
        self.repo.checkout(main_branch)?;

        let result = self
            .repo
            .merge(&self.config.integration_branch)
            .map_err(IntegrateError::from)
            .and_then(|()| {
                if self.repo.has_remote("origin")? {
                    self.repo.push("origin", main_branch)?;
                }
                Ok(())
            });

        if let Err(err) = result {
            warn!(
                target: "gatehouse::orchestrator",
                error = %err,
                "failed to advance main, restoring"
            );
            self.repo.merge_abort()?;
            self.repo.reset_hard(&main_tip)?;
            self.repo.checkout(&self.config.integration_branch)?;
            return Err(err);
        }

        self.repo.checkout(&self.config.integration_branch)?;
        Ok(())
    }

    /// Undo the attempt: abort any in-progress merge and reset the
    /// integration branch to its pre-attempt tip.
    fn rollback(&self, pre_tip: &str) -> Result<(), GitError> {
        self.repo.merge_abort()?;
        self.repo.checkout(&self.config.integration_branch)?;
        self.repo.reset_hard(pre_tip)?;
        Ok(())
    }

    /// Reach a terminal state: append the history record and consume the
    /// branch's ledger entry so a new attempt requires re-review.
    fn conclude(
        &self,
        branch: &str,
        mut transitions: Vec<IntegrationState>,
        state: IntegrationState,
        validation: ValidationResult,
        files_changed: usize,
        pushed_to_main: bool,
    ) -> Result<IntegrationOutcome, IntegrateError> {
        transitions.push(state);
        let record = self.store.append_record(IntegrationRecord::new(
            branch,
            validation,
            files_changed,
            pushed_to_main,
        ))?;
        self.store.remove_review(branch)?;
        info!(
            target: "gatehouse::orchestrator",
            branch,
            %state,
            integration_id = %record.integration_id,
            "attempt concluded"
        );
        Ok(IntegrationOutcome {
            state,
            transitions,
            record,
        })
    }
}
