//! Implementation of the `integrate` command.
//!
//! Drives one reviewed branch through the integration state machine:
//! merge into the integration branch, conflict resolution if needed, the
//! validation gate, the push decision, and cleanup. Every attempt,
//! successful or failed, appends a record to the integration history.

use std::path::Path;

use anyhow::{bail, Context, Result};
use gatehouse_core::gate::CommandValidator;
use gatehouse_core::orchestrator::{
    IntegrateError, IntegrateOptions, IntegrationOrchestrator, IntegrationState,
};

use crate::context::CommandContext;

/// Drive one integration attempt for `branch`.
///
/// Returns exit code 0 when the attempt reached `INTEGRATED` and 1 when
/// it concluded `FAILED_ROLLED_BACK`.
///
/// # Errors
///
/// Returns an error if the branch has no current review, does not
/// exist, or the attempt aborted on a VCS/gate process error.
pub fn run(
    config_path: &Path,
    branch: &str,
    confirm_push: bool,
    override_validation: bool,
) -> Result<u8> {
    let ctx = CommandContext::load(config_path)?;

    if override_validation && !ctx.config.automation.override_on_validation_failure {
        bail!(
            "--override-validation requires automation.override_on_validation_failure = true \
             in the configuration"
        );
    }

    println!("Integrating '{branch}' into '{}'...", ctx.config.integration_branch);

    let validator = CommandValidator::new(ctx.config.gate.clone());
    let orchestrator =
        IntegrationOrchestrator::new(&ctx.repo, &ctx.config, &ctx.store, &validator);
    let options = IntegrateOptions {
        confirm_push,
        override_validation,
    };

    let outcome = match orchestrator.integrate(branch, options) {
        Ok(outcome) => outcome,
        Err(IntegrateError::ReviewRequired { branch }) => {
            bail!("branch '{branch}' has no current review; run `gatehouse review` first")
        }
        Err(err) => {
            return Err(err).context(format!("integration attempt for '{branch}' aborted"))
        }
    };

    println!();
    for (step, state) in outcome.transitions.iter().enumerate() {
        println!("  [{}/{}] {state}", step + 1, outcome.transitions.len());
    }

    let validation = &outcome.record.validation;
    for error in &validation.errors {
        println!("  error: {error}");
    }
    for warning in &validation.warnings {
        println!("  warning: {warning}");
    }

    println!();
    match outcome.state {
        IntegrationState::Integrated => {
            println!(
                "Integrated '{branch}' ({} file(s) changed, pushed to {}: {}).",
                outcome.record.files_changed,
                ctx.config.main_branch,
                if outcome.record.pushed_to_main { "yes" } else { "no" }
            );
            println!("Integration id: {}", outcome.record.integration_id);
            Ok(0)
        }
        _ => {
            println!(
                "Attempt failed and was rolled back; '{}' is unchanged.",
                ctx.config.integration_branch
            );
            println!("Re-review the branch before retrying: gatehouse review");
            Ok(1)
        }
    }
}
