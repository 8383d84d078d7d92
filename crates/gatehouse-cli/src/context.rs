//! Shared command context.
//!
//! Every command starts the same way: load and validate the
//! configuration, open the repository, and open the state store. The
//! configuration is loaded once here and passed by reference into the
//! core components.

use std::path::Path;

use anyhow::{Context as _, Result};
use gatehouse_core::config::GatehouseConfig;
use gatehouse_core::git::GitRepo;
use gatehouse_core::ledger::StateStore;

/// Loaded configuration plus open handles, assembled once per command.
pub struct CommandContext {
    /// Validated configuration.
    pub config: GatehouseConfig,
    /// Repository containing the current working directory.
    pub repo: GitRepo,
    /// Ledger and history store under the configured state directory.
    pub store: StateStore,
}

impl CommandContext {
    /// Load the context for a command invocation.
    ///
    /// Configuration errors are returned unwrapped so the binary can map
    /// them to the configuration-error exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is missing or invalid, the
    /// current directory is not a git repository, or the state directory
    /// cannot be created.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config = GatehouseConfig::from_file(config_path)?;
        let repo = GitRepo::open(Path::new("."))
            .context("gatehouse must run inside the repository it gates")?;
        let state_dir = if config.state_dir.is_absolute() {
            config.state_dir.clone()
        } else {
            repo.workdir().join(&config.state_dir)
        };
        let store = StateStore::open(&state_dir).context("failed to open state directory")?;
        Ok(Self {
            config,
            repo,
            store,
        })
    }
}
