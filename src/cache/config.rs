//! Cache configuration.

use std::num::NonZeroUsize;

use metrics::counter;
use serde::Deserialize;
use tracing::error;

const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

/// What happens when a post-commit side effect (cache invalidation, search sync,
/// counter update) fails. The store write is never rolled back in either mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectPolicy {
    /// Surface the failure as the request's error.
    #[default]
    FailClosed,
    /// Log and count the failure, then report success.
    LogAndContinue,
}

impl SideEffectPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            SideEffectPolicy::FailClosed => "fail_closed",
            SideEffectPolicy::LogAndContinue => "log_and_continue",
        }
    }

    /// Apply the policy to the outcome of one side effect.
    pub fn settle<E>(self, effect: &'static str, result: Result<(), E>) -> Result<(), E>
    where
        E: std::error::Error,
    {
        let Err(err) = result else {
            return Ok(());
        };
        counter!("coursehub_side_effect_failure_total", "effect" => effect).increment(1);
        match self {
            SideEffectPolicy::FailClosed => Err(err),
            SideEffectPolicy::LogAndContinue => {
                error!(
                    effect,
                    error = %err,
                    policy = self.as_str(),
                    "Side effect failed after commit; continuing"
                );
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries held by the in-process store.
    pub memory_capacity: usize,
    pub side_effects: SideEffectPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            side_effects: SideEffectPolicy::default(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            memory_capacity: settings.memory_capacity.get(),
            side_effects: settings.side_effects,
        }
    }
}

impl CacheConfig {
    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.memory_capacity, 10_000);
        assert_eq!(config.side_effects, SideEffectPolicy::FailClosed);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            memory_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.memory_capacity_non_zero().get(), 1);
    }

    #[test]
    fn policy_parses_snake_case() {
        let policy: SideEffectPolicy = serde_json::from_str("\"log_and_continue\"").unwrap();
        assert_eq!(policy, SideEffectPolicy::LogAndContinue);
        assert_eq!(policy.as_str(), "log_and_continue");
    }

    #[test]
    fn settle_follows_policy() {
        let failure = || Err::<(), _>(std::io::Error::other("boom"));
        assert!(SideEffectPolicy::FailClosed.settle("cache", failure()).is_err());
        assert!(
            SideEffectPolicy::LogAndContinue
                .settle("cache", failure())
                .is_ok()
        );
        assert!(
            SideEffectPolicy::FailClosed
                .settle("cache", Ok::<(), std::io::Error>(()))
                .is_ok()
        );
    }
}
