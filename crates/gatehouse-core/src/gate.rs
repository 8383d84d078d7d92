// AGENT-AUTHORED
//! Validation gate.
//!
//! Runs, in sequence, a build step, a test step, a lint step, and a
//! lightweight content scan for hardcoded-secret patterns across the
//! files touched since the previous integrated state.
//!
//! Only the build step is fatal: test and lint failures and secret
//! matches are appended to `warnings` and do not by themselves fail the
//! gate. `passed` is true iff the build step succeeded.
//!
//! Validation is a trait so the orchestrator can be driven by a
//! deterministic implementation in tests; [`CommandValidator`] is the
//! production implementation.

use std::path::Path;
use std::process::Command;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::GateConfig;

/// Assignments of string literals to secret-looking names.
const SECRET_PATTERN: &str =
    r#"(?i)\b(password|passwd|api[_-]?key|apikey|secret|token)\b\s*[:=]\s*["'][^"']{4,}["']"#;

/// How many trailing output lines a failed step contributes to its
/// finding.
const STEP_OUTPUT_TAIL_LINES: usize = 10;

/// Verdict of one gate run. Created fresh per integration attempt and
/// embedded in the integration record; never persisted standalone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValidationResult {
    /// True iff the build step succeeded.
    pub passed: bool,

    /// Fatal findings (build failures).
    pub errors: Vec<String>,

    /// Advisory findings (test, lint, secret scan).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// A passing result with no findings.
    #[must_use]
    pub fn success() -> Self {
        Self {
            passed: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// A failing result with one error.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            passed: false,
            errors: vec![error.into()],
            warnings: Vec::new(),
        }
    }
}

/// Errors from the validation gate.
///
/// A step *failing* is not an error; it is a finding. Errors mean the
/// gate itself could not run (a command could not be spawned, a file
/// could not be read for reasons other than deletion).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GateError {
    /// A gate command could not be started.
    #[error("failed to spawn {step} command `{command}`: {source}")]
    Spawn {
        /// Which step ("build", "test", "lint").
        step: &'static str,
        /// The command line that failed to start.
        command: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// A validation gate implementation.
pub trait Validator {
    /// Validate the merged tree in `workdir`. `changed_files` are the
    /// paths touched since the previous integrated state (input to the
    /// secret scan).
    ///
    /// # Errors
    ///
    /// Returns an error only if the gate itself could not run; step
    /// failures are reported inside the [`ValidationResult`].
    fn validate(&self, workdir: &Path, changed_files: &[String])
        -> Result<ValidationResult, GateError>;
}

/// The production gate: runs the configured build/test/lint commands in
/// the integration worktree, then the secret scan.
pub struct CommandValidator {
    gate: GateConfig,
    secret_pattern: Regex,
}

impl CommandValidator {
    /// Build a validator from gate configuration.
    #[must_use]
    pub fn new(gate: GateConfig) -> Self {
        Self {
            gate,
            // The pattern is a compile-checked constant.
            secret_pattern: Regex::new(SECRET_PATTERN).expect("secret pattern must compile"),
        }
    }

    /// Run one command step. Returns `Ok(None)` on success and
    /// `Ok(Some(finding))` when the command exits unsuccessfully.
    fn run_step(
        &self,
        step: &'static str,
        argv: &[String],
        workdir: &Path,
    ) -> Result<Option<String>, GateError> {
        let Some((program, args)) = argv.split_first() else {
            // An empty command disables the step.
            debug!(target: "gatehouse::gate", step, "step disabled");
            return Ok(None);
        };
        info!(target: "gatehouse::gate", step, command = %argv.join(" "), "running gate step");
        let output = Command::new(program)
            .args(args)
            .current_dir(workdir)
            .output()
            .map_err(|source| GateError::Spawn {
                step,
                command: argv.join(" "),
                source,
            })?;
        if output.status.success() {
            return Ok(None);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = tail(if stderr.trim().is_empty() { &stdout } else { &stderr });
        Ok(Some(format!("{step}: `{}` failed: {detail}", argv.join(" "))))
    }

    /// Scan changed files for hardcoded-secret assignments. Deleted or
    /// unreadable files are skipped; the scan is advisory.
    fn scan_secrets(&self, workdir: &Path, changed_files: &[String]) -> Vec<String> {
        let mut findings = Vec::new();
        for file in changed_files {
            let Ok(content) = std::fs::read_to_string(workdir.join(file)) else {
                continue;
            };
            for (idx, line) in content.lines().enumerate() {
                if self.secret_pattern.is_match(line) {
                    findings.push(format!(
                        "security: possible hardcoded secret in {file}:{}",
                        idx + 1
                    ));
                }
            }
        }
        findings
    }
}

impl Validator for CommandValidator {
    fn validate(
        &self,
        workdir: &Path,
        changed_files: &[String],
    ) -> Result<ValidationResult, GateError> {
        let mut result = ValidationResult::success();

        if let Some(finding) = self.run_step("build", &self.gate.build_command, workdir)? {
            result.passed = false;
            result.errors.push(finding);
        }

        if let Some(finding) = self.run_step("test", &self.gate.test_command, workdir)? {
            result.warnings.push(finding);
        }

        if let Some(finding) = self.run_step("lint", &self.gate.lint_command, workdir)? {
            result.warnings.push(finding);
        }

        result
            .warnings
            .extend(self.scan_secrets(workdir, changed_files));

        info!(
            target: "gatehouse::gate",
            passed = result.passed,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "gate finished"
        );
        Ok(result)
    }
}

/// A deterministic validator returning a fixed result. Test double for
/// orchestrator flows; never used in production paths.
#[derive(Debug, Clone)]
pub struct StaticValidator {
    result: ValidationResult,
}

impl StaticValidator {
    /// A validator that always returns `result`.
    #[must_use]
    pub const fn new(result: ValidationResult) -> Self {
        Self { result }
    }

    /// A validator that always passes.
    #[must_use]
    pub fn passing() -> Self {
        Self::new(ValidationResult::success())
    }

    /// A validator that always fails the build step.
    #[must_use]
    pub fn failing(error: impl Into<String>) -> Self {
        Self::new(ValidationResult::failure(error))
    }
}

impl Validator for StaticValidator {
    fn validate(
        &self,
        _workdir: &Path,
        _changed_files: &[String],
    ) -> Result<ValidationResult, GateError> {
        Ok(self.result.clone())
    }
}

fn tail(output: &str) -> String {
    let lines: Vec<&str> = output.trim().lines().collect();
    let start = lines.len().saturating_sub(STEP_OUTPUT_TAIL_LINES);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| (*p).to_string()).collect()
    }

    fn gate(build: &[&str], test: &[&str], lint: &[&str]) -> GateConfig {
        GateConfig {
            build_command: argv(build),
            test_command: argv(test),
            lint_command: argv(lint),
        }
    }

    #[test]
    fn test_all_steps_pass() {
        let dir = TempDir::new().unwrap();
        let validator = CommandValidator::new(gate(&["true"], &["true"], &["true"]));
        let result = validator.validate(dir.path(), &[]).unwrap();
        assert!(result.passed);
        assert!(result.errors.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_build_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        let validator = CommandValidator::new(gate(&["false"], &["true"], &["true"]));
        let result = validator.validate(dir.path(), &[]).unwrap();
        assert!(!result.passed);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("build:"));
    }

    #[test]
    fn test_test_and_lint_failures_are_advisory() {
        let dir = TempDir::new().unwrap();
        let validator = CommandValidator::new(gate(&["true"], &["false"], &["false"]));
        let result = validator.validate(dir.path(), &[]).unwrap();
        assert!(result.passed);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings[0].starts_with("test:"));
        assert!(result.warnings[1].starts_with("lint:"));
    }

    #[test]
    fn test_failed_step_carries_output_tail() {
        let dir = TempDir::new().unwrap();
        let validator = CommandValidator::new(gate(
            &["sh", "-c", "echo compile error >&2; exit 1"],
            &["true"],
            &["true"],
        ));
        let result = validator.validate(dir.path(), &[]).unwrap();
        assert!(!result.passed);
        assert!(result.errors[0].contains("compile error"));
    }

    #[test]
    fn test_empty_command_disables_step() {
        let dir = TempDir::new().unwrap();
        let validator = CommandValidator::new(gate(&[], &[], &[]));
        let result = validator.validate(dir.path(), &[]).unwrap();
        assert!(result.passed);
    }

    #[test]
    fn test_missing_command_is_gate_error() {
        let dir = TempDir::new().unwrap();
        let validator = CommandValidator::new(gate(
            &["definitely-not-a-real-binary-gatehouse"],
            &["true"],
            &["true"],
        ));
        let err = validator.validate(dir.path(), &[]).unwrap_err();
        assert!(matches!(err, GateError::Spawn { step: "build", .. }));
    }

    #[test]
    fn test_secret_scan_flags_assignments() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.ts"),
            "const api_key = \"sk-1234567890\";\nconst color = \"blue\";\n",
        )
        .unwrap();
        let validator = CommandValidator::new(gate(&["true"], &["true"], &["true"]));
        let result = validator
            .validate(dir.path(), &["config.ts".to_string()])
            .unwrap();
        assert!(result.passed, "secret findings are advisory");
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("config.ts:1"));
    }

    #[test]
    fn test_secret_scan_skips_deleted_files() {
        let dir = TempDir::new().unwrap();
        let validator = CommandValidator::new(gate(&["true"], &["true"], &["true"]));
        let result = validator
            .validate(dir.path(), &["gone.ts".to_string()])
            .unwrap();
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_secret_scan_ignores_short_literals() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("x.py"), "password = \"\"\n").unwrap();
        let validator = CommandValidator::new(gate(&["true"], &["true"], &["true"]));
        let result = validator.validate(dir.path(), &["x.py".to_string()]).unwrap();
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_static_validator_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let validator = StaticValidator::failing("build: no");
        for _ in 0..3 {
            let result = validator.validate(dir.path(), &[]).unwrap();
            assert!(!result.passed);
            assert_eq!(result.errors, vec!["build: no".to_string()]);
        }
    }

    #[test]
    fn test_validation_result_serde_roundtrip() {
        let result = ValidationResult {
            passed: false,
            errors: vec!["build: boom".to_string()],
            warnings: vec!["test: flaky".to_string()],
        };
        let json = serde_json::to_string(&result).unwrap();
        let parsed: ValidationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }
}
