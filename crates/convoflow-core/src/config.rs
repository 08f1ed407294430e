use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::CoreError;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum interpreter steps in one invocation before the execution is aborted
    pub step_budget: u32,

    /// Lease lifetime in seconds
    pub claim_ttl_secs: u64,

    /// Extra attempts to claim a busy execution
    pub claim_retry_attempts: u32,

    /// Delay between claim attempts in milliseconds
    pub claim_retry_backoff_ms: u64,

    /// Attempts to persist a step whose side effects were already performed
    pub persist_retry_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_budget: 50,
            claim_ttl_secs: 30,
            claim_retry_attempts: 3,
            claim_retry_backoff_ms: 100,
            persist_retry_attempts: 3,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `CONVOFLOW_*` environment variables over the defaults
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        override_from(&lookup, "CONVOFLOW_STEP_BUDGET", &mut config.step_budget);
        override_from(&lookup, "CONVOFLOW_CLAIM_TTL_SECS", &mut config.claim_ttl_secs);
        override_from(
            &lookup,
            "CONVOFLOW_CLAIM_RETRY_ATTEMPTS",
            &mut config.claim_retry_attempts,
        );
        override_from(
            &lookup,
            "CONVOFLOW_CLAIM_RETRY_BACKOFF_MS",
            &mut config.claim_retry_backoff_ms,
        );
        override_from(
            &lookup,
            "CONVOFLOW_PERSIST_RETRY_ATTEMPTS",
            &mut config.persist_retry_attempts,
        );

        config
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.step_budget == 0 {
            return Err(CoreError::ConfigurationError(
                "step_budget must be greater than zero".to_string(),
            ));
        }
        if self.claim_ttl_secs == 0 {
            return Err(CoreError::ConfigurationError(
                "claim_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.persist_retry_attempts == 0 {
            return Err(CoreError::ConfigurationError(
                "persist_retry_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Lease lifetime
    pub fn claim_ttl(&self) -> Duration {
        Duration::from_secs(self.claim_ttl_secs)
    }

    /// Delay between claim attempts
    pub fn claim_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.claim_retry_backoff_ms)
    }
}

fn override_from<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *target = value,
            Err(_) => warn!("Invalid {} value: {}", key, raw),
        }
    }
}
