// AGENT-AUTHORED
//! Review ledger and integration history persistence.
//!
//! Two JSON stores live under the configured state directory:
//!
//! - `reviews.json`: the review ledger, an ordered list of
//!   [`BranchReview`] records keyed by branch. Replaced wholesale on each
//!   review cycle; re-review of a branch supersedes only that branch's
//!   entry.
//! - `history.json`: the integration history, an append-only list of
//!   [`IntegrationRecord`]s. Records are never deleted, and
//!   `integrated_at` values are monotonically non-decreasing across
//!   successive records.
//!
//! Both files are read-modify-written as a whole; single-writer
//! discipline is enforced with an advisory lock on `gatehouse.lock`, held
//! by callers across read-modify-write cycles (and across a whole
//! integration attempt). Writes go through a temp file and an atomic
//! rename.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::gate::ValidationResult;
use crate::risk::BranchReview;

const REVIEWS_FILE: &str = "reviews.json";
const HISTORY_FILE: &str = "history.json";
const LOCK_FILE: &str = "gatehouse.lock";

/// One integration attempt, successful or failed. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationRecord {
    /// Unique token for this attempt.
    pub integration_id: Uuid,

    /// Source branch.
    pub branch: String,

    /// When the attempt concluded.
    pub integrated_at: DateTime<Utc>,

    /// The gate verdict for this attempt.
    pub validation: ValidationResult,

    /// Number of files the branch changed.
    pub files_changed: usize,

    /// Whether the changes reached the main line.
    pub pushed_to_main: bool,
}

impl IntegrationRecord {
    /// Build a record for an attempt concluding now.
    #[must_use]
    pub fn new(
        branch: &str,
        validation: ValidationResult,
        files_changed: usize,
        pushed_to_main: bool,
    ) -> Self {
        Self {
            integration_id: Uuid::new_v4(),
            branch: branch.to_string(),
            integrated_at: Utc::now(),
            validation,
            files_changed,
            pushed_to_main,
        }
    }
}

/// Errors from ledger persistence.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// Filesystem access failed.
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A store file holds invalid JSON.
    #[error("corrupt ledger file {path}: {source}")]
    Corrupt {
        /// Offending file.
        path: String,
        /// Parse error.
        #[source]
        source: serde_json::Error,
    },

    /// Serialization failed.
    #[error("failed to serialize ledger state: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Held for the duration of a read-modify-write cycle (or a whole
/// integration attempt). Dropping the guard releases the lock.
#[derive(Debug)]
pub struct StateLock {
    file: File,
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// File-backed store for the review ledger and integration history.
#[derive(Debug, Clone)]
pub struct StateStore {
    state_dir: PathBuf,
}

impl StateStore {
    /// Open (creating if needed) the state directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(state_dir: &Path) -> Result<Self, LedgerError> {
        fs::create_dir_all(state_dir)?;
        Ok(Self {
            state_dir: state_dir.to_path_buf(),
        })
    }

    /// The state directory this store writes under.
    #[must_use]
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Take the exclusive advisory lock, blocking until available.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be opened or locked.
    pub fn lock(&self) -> Result<StateLock, LedgerError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.state_dir.join(LOCK_FILE))?;
        file.lock_exclusive()?;
        Ok(StateLock { file })
    }

    // ── Review ledger ────────────────────────────────────────────────

    /// Load the review ledger. A missing file is an empty ledger.
    ///
    /// # Errors
    ///
    /// Returns an error on unreadable or corrupt files.
    pub fn load_reviews(&self) -> Result<Vec<BranchReview>, LedgerError> {
        self.load_list(REVIEWS_FILE)
    }

    /// Replace the review ledger wholesale.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn save_reviews(&self, reviews: &[BranchReview]) -> Result<(), LedgerError> {
        self.write_list(REVIEWS_FILE, reviews)
    }

    /// Insert or supersede the ledger entry for `review.branch`,
    /// leaving every other entry untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or written.
    pub fn upsert_review(&self, review: &BranchReview) -> Result<(), LedgerError> {
        let mut reviews = self.load_reviews()?;
        match reviews.iter_mut().find(|r| r.branch == review.branch) {
            Some(existing) => *existing = review.clone(),
            None => reviews.push(review.clone()),
        }
        self.save_reviews(&reviews)
    }

    /// The current ledger entry for a branch, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub fn review_for(&self, branch: &str) -> Result<Option<BranchReview>, LedgerError> {
        Ok(self
            .load_reviews()?
            .into_iter()
            .find(|r| r.branch == branch))
    }

    /// Remove a branch's ledger entry (consumed by an integration
    /// attempt). Returns whether an entry existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read or written.
    pub fn remove_review(&self, branch: &str) -> Result<bool, LedgerError> {
        let mut reviews = self.load_reviews()?;
        let before = reviews.len();
        reviews.retain(|r| r.branch != branch);
        let removed = reviews.len() != before;
        if removed {
            self.save_reviews(&reviews)?;
        }
        Ok(removed)
    }

    // ── Integration history ──────────────────────────────────────────

    /// Load the full integration history.
    ///
    /// # Errors
    ///
    /// Returns an error on unreadable or corrupt files.
    pub fn load_history(&self) -> Result<Vec<IntegrationRecord>, LedgerError> {
        self.load_list(HISTORY_FILE)
    }

    /// Append one record to the integration history. Existing records
    /// are never modified or removed; the new record's timestamp is
    /// clamped forward if the clock stepped backwards, keeping
    /// `integrated_at` monotonically non-decreasing.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be read or written.
    pub fn append_record(
        &self,
        mut record: IntegrationRecord,
    ) -> Result<IntegrationRecord, LedgerError> {
        let mut history = self.load_history()?;
        if let Some(last) = history.last() {
            if record.integrated_at < last.integrated_at {
                debug!(
                    target: "gatehouse::ledger",
                    "clock stepped backwards, clamping integrated_at"
                );
                record.integrated_at = last.integrated_at;
            }
        }
        history.push(record.clone());
        self.write_list(HISTORY_FILE, &history)?;
        Ok(record)
    }

    /// The most recent integration record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be read.
    pub fn last_record(&self) -> Result<Option<IntegrationRecord>, LedgerError> {
        Ok(self.load_history()?.into_iter().next_back())
    }

    // ── Shared plumbing ──────────────────────────────────────────────

    fn load_list<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, LedgerError> {
        let path = self.state_dir.join(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&content).map_err(|source| LedgerError::Corrupt {
            path: path.display().to_string(),
            source,
        })
    }

    fn write_list<T: Serialize>(&self, name: &str, list: &[T]) -> Result<(), LedgerError> {
        let path = self.state_dir.join(name);
        let tmp = self.state_dir.join(format!("{name}.tmp"));
        let json = serde_json::to_string_pretty(list).map_err(LedgerError::Serialize)?;
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::TempDir;

    use super::*;
    use crate::risk::RiskLevel;

    fn store() -> (TempDir, StateStore) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(&dir.path().join("state")).unwrap();
        (dir, store)
    }

    fn review(branch: &str, risk: RiskLevel) -> BranchReview {
        BranchReview {
            branch: branch.to_string(),
            changed_files: vec!["src/a.rs".to_string()],
            risk_level: risk,
            issues: Vec::new(),
            conflicts_detected: false,
            reviewed_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_stores_load_empty() {
        let (_dir, store) = store();
        assert!(store.load_reviews().unwrap().is_empty());
        assert!(store.load_history().unwrap().is_empty());
        assert!(store.last_record().unwrap().is_none());
    }

    #[test]
    fn test_upsert_inserts_then_supersedes() {
        let (_dir, store) = store();
        store.upsert_review(&review("a/1", RiskLevel::Low)).unwrap();
        store.upsert_review(&review("b/1", RiskLevel::Low)).unwrap();
        store.upsert_review(&review("a/1", RiskLevel::High)).unwrap();

        let reviews = store.load_reviews().unwrap();
        assert_eq!(reviews.len(), 2, "re-review must not duplicate entries");
        assert_eq!(
            store.review_for("a/1").unwrap().unwrap().risk_level,
            RiskLevel::High
        );
        assert_eq!(
            store.review_for("b/1").unwrap().unwrap().risk_level,
            RiskLevel::Low,
            "other entries stay untouched"
        );
    }

    #[test]
    fn test_remove_review_consumes_entry() {
        let (_dir, store) = store();
        store.upsert_review(&review("a/1", RiskLevel::Low)).unwrap();
        assert!(store.remove_review("a/1").unwrap());
        assert!(!store.remove_review("a/1").unwrap());
        assert!(store.review_for("a/1").unwrap().is_none());
    }

    #[test]
    fn test_history_is_append_only() {
        let (_dir, store) = store();
        for i in 0..5 {
            let record = IntegrationRecord::new(
                &format!("b/{i}"),
                ValidationResult::success(),
                1,
                false,
            );
            store.append_record(record).unwrap();
        }
        let history = store.load_history().unwrap();
        assert_eq!(history.len(), 5);
        // Records retain insertion order and distinct ids.
        for window in history.windows(2) {
            assert_ne!(window[0].integration_id, window[1].integration_id);
            assert!(window[0].integrated_at <= window[1].integrated_at);
        }
    }

    #[test]
    fn test_backwards_clock_is_clamped() {
        let (_dir, store) = store();
        store
            .append_record(IntegrationRecord::new(
                "b/1",
                ValidationResult::success(),
                1,
                false,
            ))
            .unwrap();

        let mut stale = IntegrationRecord::new("b/2", ValidationResult::success(), 1, false);
        stale.integrated_at = stale.integrated_at - Duration::hours(1);
        let appended = store.append_record(stale).unwrap();

        let history = store.load_history().unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].integrated_at <= appended.integrated_at);
    }

    #[test]
    fn test_failed_attempts_are_recorded_too() {
        let (_dir, store) = store();
        store
            .append_record(IntegrationRecord::new(
                "b/1",
                ValidationResult::failure("build: boom"),
                3,
                false,
            ))
            .unwrap();
        let last = store.last_record().unwrap().unwrap();
        assert!(!last.validation.passed);
        assert_eq!(last.files_changed, 3);
        assert!(!last.pushed_to_main);
    }

    #[test]
    fn test_corrupt_file_is_reported_not_swallowed() {
        let (_dir, store) = store();
        fs::write(store.state_dir().join("reviews.json"), "{not json").unwrap();
        let err = store.load_reviews().unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { .. }));
    }

    #[test]
    fn test_lock_guard_can_be_retaken_after_drop() {
        let (_dir, store) = store();
        let guard = store.lock().unwrap();
        drop(guard);
        let _second = store.lock().unwrap();
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let record = IntegrationRecord::new("a/1", ValidationResult::success(), 2, true);
        let json = serde_json::to_string(&record).unwrap();
        let parsed: IntegrationRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
