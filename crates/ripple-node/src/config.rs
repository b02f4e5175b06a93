//! Node configuration.
//!
//! Every knob has a default matching the reference deployment; environment
//! variables override individual values:
//!
//! | Variable | Default |
//! |---|---|
//! | `RIPPLE_WORKERS` | 50 |
//! | `RIPPLE_QUEUE_CAPACITY` | 100 |
//! | `RIPPLE_ATTEMPT_TIMEOUT_MS` | 5000 |
//! | `RIPPLE_INITIAL_BACKOFF_MS` | 100 |
//! | `RIPPLE_MAX_BACKOFF_MS` | 10000 |

use std::time::Duration;

use ripple_protocols::PropagationConfig;

use crate::error::{Error, Result};

/// Configuration for a ripple node.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Worker pool, queue and retry tuning.
    pub propagation: PropagationConfig,
}

impl NodeConfig {
    /// Create config from environment variables with defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = PropagationConfig::default();
        let parse = |key: &str| -> Result<Option<u64>> {
            match lookup(key) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|e| Error::Config(format!("{}={:?}: {}", key, raw, e))),
            }
        };

        let count = |key: &str, default: usize| -> Result<usize> {
            match parse(key)? {
                None => Ok(default),
                Some(n) => usize::try_from(n)
                    .map_err(|_| Error::Config(format!("{}={} does not fit in usize", key, n))),
            }
        };

        let workers = count("RIPPLE_WORKERS", defaults.workers)?;
        let capacity = count("RIPPLE_QUEUE_CAPACITY", defaults.queue_capacity)?;
        let attempt_timeout = parse("RIPPLE_ATTEMPT_TIMEOUT_MS")?
            .map_or(defaults.attempt_timeout, Duration::from_millis);
        let initial_backoff = parse("RIPPLE_INITIAL_BACKOFF_MS")?
            .map_or(defaults.initial_backoff, Duration::from_millis);
        let max_backoff = parse("RIPPLE_MAX_BACKOFF_MS")?
            .map_or(defaults.max_backoff, Duration::from_millis);

        if initial_backoff > max_backoff {
            return Err(Error::Config(format!(
                "initial backoff {:?} exceeds max backoff {:?}",
                initial_backoff, max_backoff
            )));
        }

        Ok(Self {
            propagation: defaults
                .with_workers(workers)
                .with_queue_capacity(capacity)
                .with_attempt_timeout(attempt_timeout)
                .with_backoff(initial_backoff, max_backoff),
        })
    }

    /// Replace the propagation settings.
    #[must_use]
    pub fn with_propagation(mut self, propagation: PropagationConfig) -> Self {
        self.propagation = propagation;
        self
    }
}
