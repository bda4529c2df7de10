//! Context configuration.
//!
//! Every field has a default, so a TOML file only lists what it changes:
//!
//! ```toml
//! tick_interval_ms = 20
//! instance_ttl_rounds = 64
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Wake-up period of [`Context::run`](crate::Context::run) when no
    /// event arrives.
    pub tick_interval_ms: u64,

    /// Upper bound on rounds for one [`Context::settle`](crate::Context::settle).
    pub max_settle_rounds: u64,

    /// Retire signal instances this many rounds after they arrived.
    /// `None` keeps an instance until a newer one of the same signal
    /// supersedes it.
    pub instance_ttl_rounds: Option<u64>,

    /// Firing records kept by [`Context::history`](crate::Context::history).
    pub history_limit: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,
            max_settle_rounds: 256,
            instance_ttl_rounds: None,
            history_limit: 1024,
        }
    }
}

impl ContextConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, EngineError> {
        let config: Self =
            toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, EngineError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.tick_interval_ms == 0 {
            return Err(EngineError::Config("tick_interval_ms must be positive".into()));
        }
        if self.max_settle_rounds == 0 {
            return Err(EngineError::Config("max_settle_rounds must be positive".into()));
        }
        if self.instance_ttl_rounds == Some(0) {
            return Err(EngineError::Config(
                "instance_ttl_rounds must be positive when set".into(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
