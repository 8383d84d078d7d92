//! Command implementations for the gatehouse CLI.
//!
//! Each function corresponds to a subcommand and returns the process
//! exit code on success.

mod integrate;
mod monitor;
mod override_mode;
mod review;
mod status;

use std::path::Path;

use anyhow::Result;

/// Review all outstanding contributor branches.
///
/// Delegates to the review module for the actual implementation.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or a VCS query
/// fails. See [`review::run`] for details.
pub fn review(config_path: &Path) -> Result<u8> {
    review::run(config_path)
}

/// Drive one branch through the integration state machine.
///
/// Delegates to the integrate module for the actual implementation.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the branch has no
/// current review, or the attempt aborts on a process error. See
/// [`integrate::run`] for details.
pub fn integrate(
    config_path: &Path,
    branch: &str,
    confirm_push: bool,
    override_validation: bool,
) -> Result<u8> {
    integrate::run(config_path, branch, confirm_push, override_validation)
}

/// Report current branch, pending reviews, and the last integration.
///
/// Delegates to the status module for the actual implementation.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or state files
/// cannot be read. See [`status::run`] for details.
pub fn status(config_path: &Path, json: bool) -> Result<u8> {
    status::run(config_path, json)
}

/// Open an unrestricted emergency workspace.
///
/// Delegates to the `override_mode` module for the actual
/// implementation.
///
/// # Errors
///
/// Returns an error if the workspace name is invalid or the branch
/// cannot be created. See [`override_mode::run`] for details.
pub fn override_mode(config_path: &Path, name: &str) -> Result<u8> {
    override_mode::run(config_path, name)
}

/// Poll on an interval, re-reviewing and auto-integrating.
///
/// Delegates to the monitor module for the actual implementation.
///
/// # Errors
///
/// Returns an error if a poll cycle fails fatally. See [`monitor::run`]
/// for details.
pub fn monitor(config_path: &Path, interval: u64, once: bool) -> Result<u8> {
    monitor::run(config_path, interval, once)
}
