//! Workspace boundary enforcement.
//!
//! Validates that a set of changed file paths stays within a contributor's
//! declared allowed/excluded path sets.
//!
//! # Rule
//!
//! A path is **allowed** for a contributor iff it matches at least one
//! entry in `allowed_paths` as a prefix AND matches no entry in
//! `excluded_paths` as a prefix. Exclusion always wins over inclusion.
//! The boundary-declaration artifact itself ([`BOUNDARY_MANIFEST`]) is
//! always permitted.
//!
//! In its original deployment this check blocked commits outright; as a
//! library function it is pure and side-effect-free, returning the
//! violating subset for the caller to act on.

use crate::config::ContributorProfile;

/// The boundary-declaration artifact. Every contributor may touch it,
/// since boundary changes are themselves reviewed through the gate.
pub const BOUNDARY_MANIFEST: &str = "gatehouse.toml";

/// Returns true if `path` is within the contributor's declared boundary.
#[must_use]
pub fn is_path_allowed(profile: &ContributorProfile, path: &str) -> bool {
    if path == BOUNDARY_MANIFEST {
        return true;
    }
    if profile.excluded_paths.iter().any(|e| path.starts_with(e)) {
        return false;
    }
    profile.allowed_paths.iter().any(|a| path.starts_with(a))
}

/// Returns the subset of `changed_paths` that violate the contributor's
/// boundary, in input order.
#[must_use]
pub fn boundary_violations<'a>(
    profile: &ContributorProfile,
    changed_paths: &'a [String],
) -> Vec<&'a str> {
    changed_paths
        .iter()
        .map(String::as_str)
        .filter(|path| !is_path_allowed(profile, path))
        .collect()
}
