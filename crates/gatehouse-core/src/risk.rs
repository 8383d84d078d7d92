// AGENT-AUTHORED
//! Branch risk classification.
//!
//! The risk analyzer turns a branch's changed files into a [`BranchReview`]:
//! an ordered list of `(pattern, tag)` pairs is tested against each changed
//! file, a non-destructive merge probe checks for irreconcilable hunks, and
//! the boundary enforcer flags out-of-scope paths for the owning
//! contributor.
//!
//! Classification is deterministic: given identical changed files and
//! pattern set, repeated review of an unchanged branch produces an
//! identical [`BranchReview`] apart from its timestamp. Branches with no
//! matching contributor profile are reviewable but unclassified for
//! ownership.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::boundary::boundary_violations;
use crate::config::{ContributorProfile, GatehouseConfig, RiskPatternConfig};
use crate::git::{GitError, GitRepo};

/// Default sensitive-path patterns, used when the configuration declares
/// none. Ordered; each `(pattern, tag)` pair records at most one issue.
pub const DEFAULT_RISK_PATTERNS: &[(&str, &str)] = &[
    (r"(^|/)(schema|migrations)/", "database-change"),
    (r"(?i)(^|/)\.env(\.|$)", "environment-change"),
    (r"(?i)(^|/)auth(/|\.)", "security-sensitive"),
    (r"(?i)(secret|credential)", "security-sensitive"),
];

/// Coarse classification of how sensitive a branch's changes are.
///
/// Drives whether human review or auto-approval applies: only `Low`
/// branches qualify for auto-approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// No risk signals detected.
    #[default]
    Low,
    /// Sensitive paths touched, conflicts probed, or boundary violated.
    High,
}

impl RiskLevel {
    /// Returns true for [`RiskLevel::High`].
    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, Self::High)
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// A compiled sensitive-path pattern.
#[derive(Debug, Clone)]
pub struct RiskPattern {
    regex: Regex,
    tag: String,
}

impl RiskPattern {
    /// Compile a configured pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the regular expression does not compile.
    /// Configuration validation catches this earlier in normal operation.
    pub fn compile(config: &RiskPatternConfig) -> Result<Self, RiskError> {
        Ok(Self {
            regex: Regex::new(&config.pattern).map_err(RiskError::Pattern)?,
            tag: config.tag.clone(),
        })
    }

    /// The risk tag this pattern records.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// The built-in pattern set (see [`DEFAULT_RISK_PATTERNS`]).
#[must_use]
pub fn default_risk_patterns() -> Vec<RiskPattern> {
    DEFAULT_RISK_PATTERNS
        .iter()
        .map(|(pattern, tag)| RiskPattern {
            // Built-in patterns are compile-checked by tests.
            regex: Regex::new(pattern).expect("built-in risk pattern must compile"),
            tag: (*tag).to_string(),
        })
        .collect()
}

/// The result of reviewing one contributor branch.
///
/// Appended to the review ledger; superseded (not mutated) on re-review
/// of the same branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchReview {
    /// Branch name.
    pub branch: String,

    /// Files changed relative to the merge base with the integration
    /// branch.
    pub changed_files: Vec<String>,

    /// Risk classification.
    pub risk_level: RiskLevel,

    /// Issues, each of the form `"category: path"`.
    pub issues: Vec<String>,

    /// Whether the merge probe reported irreconcilable hunks.
    pub conflicts_detected: bool,

    /// When this review was produced.
    pub reviewed_at: DateTime<Utc>,
}

/// Errors from the risk analyzer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RiskError {
    /// A pattern failed to compile.
    #[error("invalid risk pattern: {0}")]
    Pattern(#[source] regex::Error),

    /// The underlying VCS query failed.
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Classify changed files against the pattern set.
///
/// Each `(pattern, tag)` pair records at most one issue (the first
/// matching file), keeping the issue list deduplicated per tag while a
/// single file may still trigger several tags.
#[must_use]
pub fn classify(changed_files: &[String], patterns: &[RiskPattern]) -> Vec<String> {
    let mut issues = Vec::new();
    let mut seen_tags: HashSet<&str> = HashSet::new();
    for pattern in patterns {
        if seen_tags.contains(pattern.tag.as_str()) {
            continue;
        }
        if let Some(file) = changed_files.iter().find(|f| pattern.regex.is_match(f)) {
            issues.push(format!("{}: {file}", pattern.tag));
            seen_tags.insert(pattern.tag.as_str());
        }
    }
    issues
}

/// Assemble a [`BranchReview`] from already-gathered facts.
///
/// Pure apart from the supplied timestamp: the risk level is a function
/// of the changed files, the pattern set, conflict presence, and
/// boundary-violation presence.
#[must_use]
pub fn build_review(
    branch: &str,
    changed_files: Vec<String>,
    conflicts_detected: bool,
    contributor: Option<&ContributorProfile>,
    patterns: &[RiskPattern],
    reviewed_at: DateTime<Utc>,
) -> BranchReview {
    let mut issues = classify(&changed_files, patterns);

    if let Some(profile) = contributor {
        for path in boundary_violations(profile, &changed_files) {
            issues.push(format!(
                "Boundary violation: {path} outside {} scope",
                profile.key
            ));
        }
    }

    let risk_level = if !issues.is_empty() || conflicts_detected {
        RiskLevel::High
    } else {
        RiskLevel::Low
    };

    BranchReview {
        branch: branch.to_string(),
        changed_files,
        risk_level,
        issues,
        conflicts_detected,
        reviewed_at,
    }
}

/// The risk analyzer: configuration plus a compiled pattern set.
pub struct RiskAnalyzer<'a> {
    config: &'a GatehouseConfig,
    patterns: Vec<RiskPattern>,
}

impl<'a> RiskAnalyzer<'a> {
    /// Build an analyzer from configuration, compiling the configured
    /// patterns (or the built-in defaults when none are configured).
    ///
    /// # Errors
    ///
    /// Returns an error if a configured pattern does not compile.
    pub fn new(config: &'a GatehouseConfig) -> Result<Self, RiskError> {
        let patterns = if config.risk_patterns.is_empty() {
            default_risk_patterns()
        } else {
            config
                .risk_patterns
                .iter()
                .map(RiskPattern::compile)
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(Self { config, patterns })
    }

    /// The active pattern set.
    #[must_use]
    pub fn patterns(&self) -> &[RiskPattern] {
        &self.patterns
    }

    /// Review one branch against the integration branch.
    ///
    /// Gathers the changed-file set relative to the merge base, runs the
    /// non-destructive merge probe, resolves the owning contributor by
    /// branch prefix, and assembles the review.
    ///
    /// # Errors
    ///
    /// Returns an error if any VCS query fails.
    pub fn review_branch(&self, repo: &GitRepo, branch: &str) -> Result<BranchReview, RiskError> {
        let target = &self.config.integration_branch;
        let changed_files = repo.changed_files(target, branch)?;
        let conflicts_detected = repo.merge_probe(target, branch)?;
        let contributor = self.config.contributor_for_branch(branch);
        debug!(
            target: "gatehouse::risk",
            branch,
            files = changed_files.len(),
            conflicts = conflicts_detected,
            owner = contributor.map(|c| c.key.as_str()).unwrap_or("<unowned>"),
            "reviewing branch"
        );
        Ok(build_review(
            branch,
            changed_files,
            conflicts_detected,
            contributor,
            &self.patterns,
            Utc::now(),
        ))
    }
}
