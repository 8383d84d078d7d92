//! Configuration parsing and management.
//!
//! This module handles parsing of the gatehouse configuration file (TOML)
//! that defines contributor profiles, branch names, risk patterns, and
//! automation policy.
//!
//! Configuration is loaded once at startup into a [`GatehouseConfig`] value
//! and passed by reference into every component. There is no global
//! configuration state.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level gatehouse configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatehouseConfig {
    /// Shared staging branch that reviewed contributor branches merge into.
    pub integration_branch: String,

    /// Final destination branch.
    pub main_branch: String,

    /// Directory holding the review ledger, integration history, and lock
    /// file. Relative paths are resolved against the repository root.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Contributor profiles.
    #[serde(default)]
    pub contributors: Vec<ContributorProfile>,

    /// Ordered sensitive-path patterns. When empty, a built-in default set
    /// is used (see [`crate::risk::default_risk_patterns`]).
    #[serde(default)]
    pub risk_patterns: Vec<RiskPatternConfig>,

    /// Automation policy.
    #[serde(default)]
    pub automation: AutomationConfig,

    /// Validation gate commands.
    #[serde(default)]
    pub gate: GateConfig,
}

/// A contributor's workspace boundary declaration.
///
/// Profiles are created from static configuration at startup and are
/// immutable during a run. A path is allowed for a contributor iff it
/// matches at least one `allowed_paths` prefix and no `excluded_paths`
/// prefix; exclusion always wins over inclusion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContributorProfile {
    /// Unique contributor id (e.g. "frontend").
    pub key: String,

    /// Prefix all of this contributor's branches must start with
    /// (e.g. "frontend/").
    pub branch_prefix: String,

    /// Ordered set of path prefixes this contributor may modify.
    pub allowed_paths: Vec<String>,

    /// Path prefixes this contributor may never modify; overrides
    /// `allowed_paths`.
    #[serde(default)]
    pub excluded_paths: Vec<String>,
}

/// A single sensitive-path pattern as written in configuration.
///
/// `pattern` is a regular expression tested against each changed file
/// path; `tag` is the risk category recorded in review issues
/// (e.g. "database-change").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskPatternConfig {
    /// Regular expression matched against changed file paths.
    pub pattern: String,

    /// Risk tag recorded as `"tag: path"` in review issues.
    pub tag: String,
}

/// Automation policy flags.
///
/// All flags default to `false`: out of the box gatehouse reviews and
/// integrates only on explicit operator action and never pushes or deletes
/// branches on its own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct AutomationConfig {
    /// Auto-integrate low-risk, violation-free branches during `monitor`.
    #[serde(default)]
    pub auto_approve: bool,

    /// Merge the integration branch into main and push without an explicit
    /// confirmation.
    #[serde(default)]
    pub auto_push: bool,

    /// Delete the source branch after a successful push.
    #[serde(default)]
    pub auto_delete_merged_branch: bool,

    /// Allow integration to proceed past a failed validation gate.
    /// The failure is still recorded in the integration history.
    #[serde(default)]
    pub override_on_validation_failure: bool,
}

/// Validation gate commands.
///
/// Each command is an argv vector executed in the integration worktree.
/// The build command is the fatal step; test and lint failures are
/// recorded as warnings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateConfig {
    /// Build step; failure fails the gate.
    #[serde(default = "default_build_command")]
    pub build_command: Vec<String>,

    /// Test step; failure is advisory.
    #[serde(default = "default_test_command")]
    pub test_command: Vec<String>,

    /// Lint step; failure is advisory.
    #[serde(default = "default_lint_command")]
    pub lint_command: Vec<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            build_command: default_build_command(),
            test_command: default_test_command(),
            lint_command: default_lint_command(),
        }
    }
}

impl GatehouseConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or the parsed configuration
    /// fails validation (see [`GatehouseConfig::validate`]).
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate the configuration, failing closed on anything malformed.
    ///
    /// A malformed profile is a configuration error, not a runtime
    /// failure: nothing downstream of this check has to re-validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if:
    /// - `integration_branch` or `main_branch` is empty, or they are equal
    /// - a contributor has an empty `key`, `branch_prefix`, or
    ///   `allowed_paths`
    /// - two contributors share a `key` or a `branch_prefix`
    /// - a risk pattern has an empty `tag` or a regex that does not compile
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.integration_branch.trim().is_empty() {
            return Err(ConfigError::Validation(
                "integration_branch must not be empty".to_string(),
            ));
        }
        if self.main_branch.trim().is_empty() {
            return Err(ConfigError::Validation(
                "main_branch must not be empty".to_string(),
            ));
        }
        if self.integration_branch == self.main_branch {
            return Err(ConfigError::Validation(format!(
                "integration_branch and main_branch must differ (both are '{}')",
                self.main_branch
            )));
        }

        let mut keys = HashSet::new();
        let mut prefixes = HashSet::new();
        for contributor in &self.contributors {
            if contributor.key.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "contributor key must not be empty".to_string(),
                ));
            }
            if contributor.branch_prefix.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "contributor '{}' has an empty branch_prefix",
                    contributor.key
                )));
            }
            if contributor.allowed_paths.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "contributor '{}' declares no allowed_paths",
                    contributor.key
                )));
            }
            if !keys.insert(contributor.key.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate contributor key '{}'",
                    contributor.key
                )));
            }
            if !prefixes.insert(contributor.branch_prefix.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate branch_prefix '{}' (contributor '{}')",
                    contributor.branch_prefix, contributor.key
                )));
            }
        }

        for rp in &self.risk_patterns {
            if rp.tag.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "risk pattern '{}' has an empty tag",
                    rp.pattern
                )));
            }
            regex::Regex::new(&rp.pattern).map_err(|err| {
                ConfigError::Validation(format!(
                    "risk pattern '{}' is not a valid regex: {err}",
                    rp.pattern
                ))
            })?;
        }

        Ok(())
    }

    /// Find the contributor profile whose `branch_prefix` matches a branch
    /// name. Unowned branches are reviewable but unclassified for
    /// ownership, so `None` is not an error.
    #[must_use]
    pub fn contributor_for_branch(&self, branch: &str) -> Option<&ContributorProfile> {
        self.contributors
            .iter()
            .find(|c| branch.starts_with(&c.branch_prefix))
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".gatehouse")
}

fn default_build_command() -> Vec<String> {
    vec!["cargo".into(), "check".into(), "--workspace".into()]
}

fn default_test_command() -> Vec<String> {
    vec!["cargo".into(), "test".into(), "--workspace".into()]
}

fn default_lint_command() -> Vec<String> {
    vec![
        "cargo".into(),
        "clippy".into(),
        "--workspace".into(),
        "--".into(),
        "-D".into(),
        "warnings".into(),
    ]
}

/// Errors that can occur during configuration handling.
///
/// Configuration errors are fatal: they abort before any state mutation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[source] std::io::Error),

    /// The TOML could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[source] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[source] toml::ser::Error),

    /// The configuration parsed but is semantically invalid.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
integration_branch = "integration"
main_branch = "main"

[[contributors]]
key = "frontend"
branch_prefix = "frontend/"
allowed_paths = ["src/frontend/"]
excluded_paths = ["src/frontend/secrets/"]
"#
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = GatehouseConfig::from_toml(minimal_toml()).unwrap();
        assert_eq!(config.integration_branch, "integration");
        assert_eq!(config.main_branch, "main");
        assert_eq!(config.state_dir, PathBuf::from(".gatehouse"));
        assert_eq!(config.contributors.len(), 1);
        assert_eq!(config.contributors[0].key, "frontend");
        assert!(!config.automation.auto_push);
    }

    #[test]
    fn test_gate_defaults() {
        let config = GatehouseConfig::from_toml(minimal_toml()).unwrap();
        assert_eq!(config.gate.build_command[0], "cargo");
        assert_eq!(config.gate.build_command[1], "check");
        assert_eq!(config.gate.test_command[1], "test");
        assert_eq!(config.gate.lint_command[1], "clippy");
    }

    #[test]
    fn test_empty_integration_branch_rejected() {
        let toml = r#"
integration_branch = ""
main_branch = "main"
"#;
        let err = GatehouseConfig::from_toml(toml).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_same_branch_names_rejected() {
        let toml = r#"
integration_branch = "main"
main_branch = "main"
"#;
        let err = GatehouseConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_contributor_without_allowed_paths_rejected() {
        let toml = r#"
integration_branch = "integration"
main_branch = "main"

[[contributors]]
key = "backend"
branch_prefix = "backend/"
allowed_paths = []
"#;
        let err = GatehouseConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("no allowed_paths"));
    }

    #[test]
    fn test_duplicate_branch_prefix_rejected() {
        let toml = r#"
integration_branch = "integration"
main_branch = "main"

[[contributors]]
key = "a"
branch_prefix = "team/"
allowed_paths = ["src/a/"]

[[contributors]]
key = "b"
branch_prefix = "team/"
allowed_paths = ["src/b/"]
"#;
        let err = GatehouseConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("duplicate branch_prefix"));
    }

    #[test]
    fn test_invalid_risk_pattern_regex_rejected() {
        let toml = r#"
integration_branch = "integration"
main_branch = "main"

[[risk_patterns]]
pattern = "("
tag = "broken"
"#;
        let err = GatehouseConfig::from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("not a valid regex"));
    }

    #[test]
    fn test_contributor_for_branch() {
        let config = GatehouseConfig::from_toml(minimal_toml()).unwrap();
        assert_eq!(
            config
                .contributor_for_branch("frontend/task1")
                .map(|c| c.key.as_str()),
            Some("frontend")
        );
        assert!(config.contributor_for_branch("backend/task2").is_none());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = GatehouseConfig::from_toml(minimal_toml()).unwrap();
        let serialized = config.to_toml().unwrap();
        let reparsed = GatehouseConfig::from_toml(&serialized).unwrap();
        assert_eq!(reparsed.contributors, config.contributors);
        assert_eq!(reparsed.integration_branch, config.integration_branch);
    }

    #[test]
    fn test_automation_flags_parse() {
        let toml = r#"
integration_branch = "integration"
main_branch = "main"

[automation]
auto_approve = true
auto_push = true
auto_delete_merged_branch = true
override_on_validation_failure = false
"#;
        let config = GatehouseConfig::from_toml(toml).unwrap();
        assert!(config.automation.auto_approve);
        assert!(config.automation.auto_push);
        assert!(config.automation.auto_delete_merged_branch);
        assert!(!config.automation.override_on_validation_failure);
    }
}
