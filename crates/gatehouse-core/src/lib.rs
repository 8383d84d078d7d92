//! Gatehouse core: the integration gatekeeper.
//!
//! Reviews branches produced by independent contributors, enforces
//! per-contributor workspace boundaries, classifies risk, resolves
//! trivial merge conflicts, runs a validation gate, and decides whether
//! to advance changes into a shared integration branch and ultimately
//! into the main line, with rollback on failure.
//!
//! # Components
//!
//! - [`boundary`]: allowed/excluded path-prefix enforcement per
//!   contributor.
//! - [`risk`]: sensitive-path classification, merge probe, and
//!   [`risk::BranchReview`] assembly.
//! - [`resolve`]: deterministic per-file conflict resolution.
//! - [`gate`]: build/test/lint/secret-scan validation behind the
//!   [`gate::Validator`] trait.
//! - [`orchestrator`]: the merge/validate/push state machine with
//!   rollback atomicity.
//! - [`ledger`]: the review ledger and append-only integration history.
//! - [`config`]: the explicit configuration struct every component
//!   receives by reference.
//! - [`git`]: the blocking VCS command wrapper.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use gatehouse_core::config::GatehouseConfig;
//! use gatehouse_core::gate::CommandValidator;
//! use gatehouse_core::git::GitRepo;
//! use gatehouse_core::ledger::StateStore;
//! use gatehouse_core::orchestrator::{IntegrateOptions, IntegrationOrchestrator};
//! use gatehouse_core::risk::RiskAnalyzer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatehouseConfig::from_file(Path::new("gatehouse.toml"))?;
//! let repo = GitRepo::open(Path::new("."))?;
//! let store = StateStore::open(&config.state_dir)?;
//!
//! // Review, then integrate.
//! let analyzer = RiskAnalyzer::new(&config)?;
//! let review = analyzer.review_branch(&repo, "frontend/task1")?;
//! store.upsert_review(&review)?;
//!
//! let validator = CommandValidator::new(config.gate.clone());
//! let orchestrator = IntegrationOrchestrator::new(&repo, &config, &store, &validator);
//! let outcome = orchestrator.integrate("frontend/task1", IntegrateOptions::default())?;
//! println!("final state: {}", outcome.state);
//! # Ok(())
//! # }
//! ```

pub mod boundary;
pub mod config;
pub mod gate;
pub mod git;
pub mod ledger;
pub mod orchestrator;
pub mod resolve;
pub mod risk;
