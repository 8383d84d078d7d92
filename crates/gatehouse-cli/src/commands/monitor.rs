//! Implementation of the `monitor` command.
//!
//! Polls on an interval: re-runs the review pass, flags stale ledger
//! entries, and, when `automation.auto_approve` is enabled,
//! auto-integrates branches that are low risk, conflict-free, and
//! violation-free. Boundary violations and sensitive-path matches both
//! surface as issues, so either blocks auto-approval.
//!
//! The loop runs until the process is terminated; `--once` runs a
//! single cycle for scripting.

use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use gatehouse_core::gate::CommandValidator;
use gatehouse_core::orchestrator::{IntegrateOptions, IntegrationOrchestrator};
use gatehouse_core::risk::BranchReview;
use tracing::info;

use crate::commands::review::review_outstanding;
use crate::context::CommandContext;

/// Reviews older than this are flagged as stale: the branch likely
/// moved or the operator forgot about it.
const STALE_AFTER_SECS: i64 = 30 * 60;

/// Run the monitor loop.
///
/// # Errors
///
/// Returns an error if a poll cycle fails fatally (invalid
/// configuration, VCS process errors).
pub fn run(config_path: &Path, interval: u64, once: bool) -> Result<u8> {
    println!(
        "Monitoring every {interval}s (auto-approve: {}). Ctrl-C to stop.",
        if CommandContext::load(config_path)?.config.automation.auto_approve {
            "on"
        } else {
            "off"
        }
    );

    loop {
        poll_cycle(config_path)?;
        if once {
            return Ok(0);
        }
        thread::sleep(Duration::from_secs(interval));
    }
}

/// One poll cycle: review, staleness check, optional auto-integration.
fn poll_cycle(config_path: &Path) -> Result<()> {
    // Reload per cycle so configuration edits take effect without a
    // restart.
    let ctx = CommandContext::load(config_path)?;

    let reviews = review_outstanding(&ctx)?;
    info!(target: "gatehouse::monitor", reviewed = reviews.len(), "poll cycle");
    if !reviews.is_empty() {
        println!("[monitor] reviewed {} branch(es)", reviews.len());
    }

    for review in &ctx.store.load_reviews()? {
        let age = Utc::now().signed_duration_since(review.reviewed_at);
        if age.num_seconds() > STALE_AFTER_SECS {
            println!(
                "[monitor] stale review: {} (reviewed {} minutes ago)",
                review.branch,
                age.num_minutes()
            );
        }
    }

    if ctx.config.automation.auto_approve {
        let validator = CommandValidator::new(ctx.config.gate.clone());
        let orchestrator =
            IntegrationOrchestrator::new(&ctx.repo, &ctx.config, &ctx.store, &validator);
        for review in reviews {
            if !auto_approvable(&review) {
                continue;
            }
            println!("[monitor] auto-integrating {}", review.branch);
            match orchestrator.integrate(&review.branch, IntegrateOptions::default()) {
                Ok(outcome) => {
                    println!("[monitor]   -> {}", outcome.state);
                }
                Err(err) => {
                    // One branch failing must not stop the loop.
                    println!("[monitor]   -> aborted: {err:#}");
                }
            }
        }
    }

    Ok(())
}

/// Auto-approval applies only to branches with no risk signals at all:
/// low risk, no issues (boundary violations included), no probe
/// conflicts.
fn auto_approvable(review: &BranchReview) -> bool {
    !review.risk_level.is_high() && review.issues.is_empty() && !review.conflicts_detected
}

#[cfg(test)]
mod tests {
    use gatehouse_core::risk::RiskLevel;

    use super::*;

    fn review(risk: RiskLevel, issues: Vec<String>, conflicts: bool) -> BranchReview {
        BranchReview {
            branch: "backend/x".to_string(),
            changed_files: vec!["src/backend/x.rs".to_string()],
            risk_level: risk,
            issues,
            conflicts_detected: conflicts,
            reviewed_at: Utc::now(),
        }
    }

    #[test]
    fn test_clean_low_risk_branch_is_auto_approvable() {
        assert!(auto_approvable(&review(RiskLevel::Low, vec![], false)));
    }

    #[test]
    fn test_high_risk_blocks_auto_approval() {
        assert!(!auto_approvable(&review(RiskLevel::High, vec![], false)));
    }

    #[test]
    fn test_boundary_violation_blocks_auto_approval() {
        assert!(!auto_approvable(&review(
            RiskLevel::Low,
            vec!["Boundary violation: x outside frontend scope".to_string()],
            false
        )));
    }

    #[test]
    fn test_probe_conflicts_block_auto_approval() {
        assert!(!auto_approvable(&review(RiskLevel::Low, vec![], true)));
    }
}
