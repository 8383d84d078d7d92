//! Implementation of the `status` command.
//!
//! Reports the currently checked-out branch, the integration branch
//! tip, pending reviews from the ledger, and the most recent
//! integration record.

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use crate::context::CommandContext;

/// Print the current gatekeeper state.
///
/// # Errors
///
/// Returns an error if state files or the repository cannot be read.
pub fn run(config_path: &Path, json_output: bool) -> Result<u8> {
    let ctx = CommandContext::load(config_path)?;

    let current = ctx.repo.current_branch()?;
    let integration_tip = ctx.repo.rev_parse(&ctx.config.integration_branch)?;
    let reviews = ctx.store.load_reviews()?;
    let last = ctx.store.last_record()?;

    if json_output {
        let payload = json!({
            "current_branch": current,
            "integration_branch": ctx.config.integration_branch,
            "integration_tip": integration_tip,
            "pending_reviews": reviews,
            "last_integration": last,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(0);
    }

    println!("Current branch:     {current}");
    println!(
        "Integration branch: {} @ {}",
        ctx.config.integration_branch,
        &integration_tip[..12.min(integration_tip.len())]
    );

    if reviews.is_empty() {
        println!("Pending reviews:    none");
    } else {
        println!("Pending reviews:    {}", reviews.len());
        for review in &reviews {
            let conflicts = if review.conflicts_detected {
                " [conflicts]"
            } else {
                ""
            };
            println!(
                "  {}  risk={}{}  reviewed {}",
                review.branch,
                review.risk_level,
                conflicts,
                review.reviewed_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
    }

    match last {
        Some(record) => {
            println!(
                "Last integration:   {} ({}) at {} - {}",
                record.branch,
                if record.validation.passed {
                    "passed"
                } else {
                    "failed"
                },
                record.integrated_at.format("%Y-%m-%d %H:%M:%S UTC"),
                record.integration_id
            );
        }
        None => println!("Last integration:   none"),
    }

    Ok(0)
}
