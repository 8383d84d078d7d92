//! Implementation of the `review` command.
//!
//! Runs the risk analyzer over every outstanding contributor branch:
//! - Lists local branches matching a configured contributor prefix
//! - Skips branches already contained in the integration branch
//! - Writes each review into the ledger (superseding prior entries)
//! - Prints a summary table

use std::path::Path;

use anyhow::{Context, Result};
use gatehouse_core::risk::{BranchReview, RiskAnalyzer};

use crate::context::CommandContext;

/// Review all outstanding contributor branches and update the ledger.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or a VCS query
/// fails.
pub fn run(config_path: &Path) -> Result<u8> {
    let ctx = CommandContext::load(config_path)?;
    let reviews = review_outstanding(&ctx)?;

    if reviews.is_empty() {
        println!("No outstanding contributor branches.");
        return Ok(0);
    }

    println!(
        "Reviewed {} branch(es) against '{}':\n",
        reviews.len(),
        ctx.config.integration_branch
    );
    for review in &reviews {
        print_review(review);
    }
    Ok(0)
}

/// Review every outstanding contributor branch, updating the ledger
/// under the store lock. Shared with the monitor loop.
pub(crate) fn review_outstanding(ctx: &CommandContext) -> Result<Vec<BranchReview>> {
    let analyzer = RiskAnalyzer::new(&ctx.config).context("failed to compile risk patterns")?;
    let _lock = ctx.store.lock().context("failed to lock state store")?;

    let mut reviews = Vec::new();
    for branch in ctx.repo.list_branches()? {
        // Contributor branches are in scope; so are override workspaces,
        // which review as unowned (no boundary classification).
        if ctx.config.contributor_for_branch(&branch).is_none()
            && !branch.starts_with(super::override_mode::OVERRIDE_PREFIX)
        {
            continue;
        }
        // Already-integrated branches have nothing outstanding.
        if ctx
            .repo
            .is_ancestor(&branch, &ctx.config.integration_branch)?
        {
            continue;
        }
        let review = analyzer
            .review_branch(&ctx.repo, &branch)
            .with_context(|| format!("failed to review branch '{branch}'"))?;
        ctx.store.upsert_review(&review)?;
        reviews.push(review);
    }
    Ok(reviews)
}

fn print_review(review: &BranchReview) {
    let conflicts = if review.conflicts_detected {
        " [conflicts]"
    } else {
        ""
    };
    println!(
        "  {}  risk={}{}  files={}",
        review.branch,
        review.risk_level,
        conflicts,
        review.changed_files.len()
    );
    for issue in &review.issues {
        println!("    - {issue}");
    }
}
