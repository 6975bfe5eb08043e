//! Queue store configuration

use crate::error::{QueueError, Result};
use crate::types::ClearMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides (`ENCORE_QUEUE_CLEAR_MODE=all`)
const ENV_PREFIX: &str = "ENCORE_QUEUE";

/// Configuration for the queue store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Behaviour of `clear_current` (default: `Head`)
    pub clear_mode: ClearMode,

    /// Capacity reserved when a tenant's queue is first created (default: 16)
    pub tenant_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            clear_mode: ClearMode::Head,
            tenant_capacity: 16,
        }
    }
}

impl QueueConfig {
    /// Load configuration from an optional TOML file and the environment
    ///
    /// A missing file is not an error; defaults apply. Environment variables
    /// prefixed with `ENCORE_QUEUE_` override file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = ::config::Config::builder();

        if let Some(path) = path {
            if path.exists() {
                settings = settings.add_source(::config::File::from(path.to_path_buf()));
            }
        }

        settings = settings.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;

        tracing::debug!(
            clear_mode = ?config.clear_mode,
            tenant_capacity = config.tenant_capacity,
            "Loaded queue configuration"
        );

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.tenant_capacity > 1 << 20 {
            return Err(QueueError::Config(format!(
                "tenant_capacity {} is unreasonably large",
                self.tenant_capacity
            )));
        }
        Ok(())
    }
}
