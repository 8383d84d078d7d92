//! Implementation of the `override` command.
//!
//! Opens an unrestricted emergency workspace: a branch cut from the
//! integration branch whose changes are not subject to boundary checks
//! (override branches carry no contributor prefix, so the risk analyzer
//! reviews them without an ownership classification). Every override is
//! appended to an audit log in the state directory.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::warn;

use crate::context::CommandContext;

/// Audit log of override workspaces, one line per invocation.
const OVERRIDE_LOG: &str = "override.log";

/// Branch namespace for emergency workspaces.
pub(crate) const OVERRIDE_PREFIX: &str = "override/";

/// Create and check out `override/<name>` from the integration branch.
///
/// # Errors
///
/// Returns an error if the name is invalid, the branch already exists,
/// or the audit record cannot be written.
pub fn run(config_path: &Path, name: &str) -> Result<u8> {
    validate_name(name)?;
    let ctx = CommandContext::load(config_path)?;

    let branch = format!("{OVERRIDE_PREFIX}{name}");
    if ctx.repo.branch_exists(&branch)? {
        bail!("override workspace '{branch}' already exists");
    }

    ctx.repo
        .create_branch(&branch, &ctx.config.integration_branch)
        .with_context(|| format!("failed to create '{branch}'"))?;

    // The bypass must always leave a trace, even if the branch is later
    // deleted.
    record_override(&ctx, &branch)?;
    warn!(target: "gatehouse::override", branch, "unrestricted workspace opened");

    println!("Opened unrestricted workspace '{branch}'.");
    println!("Boundary checks do not constrain this branch; use it for emergency fixes only.");
    println!("Integrate it like any other branch: gatehouse review && gatehouse integrate {branch}");
    Ok(0)
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("override workspace name must not be empty");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        bail!("override workspace name may contain only letters, digits, '-' and '_'");
    }
    Ok(())
}

fn record_override(ctx: &CommandContext, branch: &str) -> Result<()> {
    let path = ctx.store.state_dir().join(OVERRIDE_LOG);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    writeln!(
        file,
        "{} opened {branch} from {}",
        chrono::Utc::now().to_rfc3339(),
        ctx.config.integration_branch
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names_accepted() {
        assert!(validate_name("hotfix-123").is_ok());
        assert!(validate_name("sev1_rollout").is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(validate_name("").is_err());
    }

    #[test]
    fn test_path_like_names_rejected() {
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name("fix me").is_err());
    }
}
