//! Configuration for the sync engine.

use fieldsync_model::{EntityKind, MergeRules, PolicyTable};
use std::collections::HashMap;
use std::time::Duration;

/// Tunables for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Most actions allowed in flight at once (the global bound).
    pub max_in_flight: usize,
    /// Most actions drawn from the queue per dispatch wave.
    pub batch_size: usize,
    /// Retry and backoff behavior.
    pub retry: RetryConfig,
    /// Conflict policy per entity kind.
    pub policies: PolicyTable,
    /// Field merge rule overrides; kinds without an entry use
    /// [`MergeRules::defaults_for`].
    pub merge_rules: HashMap<EntityKind, MergeRules>,
}

impl SyncConfig {
    /// Creates a configuration with field-data defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_in_flight: 4,
            batch_size: 32,
            retry: RetryConfig::default(),
            policies: PolicyTable::default(),
            merge_rules: HashMap::new(),
        }
    }

    /// Sets the in-flight bound.
    #[must_use]
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    /// Sets the dispatch wave size.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the conflict policy table.
    #[must_use]
    pub fn with_policies(mut self, policies: PolicyTable) -> Self {
        self.policies = policies;
        self
    }

    /// Overrides the merge rules for one entity kind.
    #[must_use]
    pub fn with_merge_rules(mut self, kind: EntityKind, rules: MergeRules) -> Self {
        self.merge_rules.insert(kind, rules);
        self
    }

    /// Returns the merge rules for an entity kind.
    #[must_use]
    pub fn merge_rules_for(&self, kind: EntityKind) -> MergeRules {
        self.merge_rules
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| MergeRules::defaults_for(kind))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts before an action is marked failed.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling on the exponential delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration with the given attempt budget.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration where the first failure is terminal.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter for deterministic scheduling tests.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Calculates the delay before the given attempt (0-indexed).
    ///
    /// Attempt 0 is the first try and has no delay. Later attempts back
    /// off exponentially up to `max_delay`, plus up to 25% jitter when
    /// enabled so a fleet of devices regaining connectivity does not
    /// retry in lockstep.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            let jitter = delay_secs * 0.25 * rand_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Simple deterministic "jitter" (no external RNG dependency).
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}
