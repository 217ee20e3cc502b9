use std::time::Duration;

use tracing::warn;

use crate::Backoff;

pub const BACKOFF_BASE_ENV: &str = "FANOUT_BACKOFF_BASE_MS";
pub const BACKOFF_CEILING_ENV: &str = "FANOUT_BACKOFF_CEILING_MS";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub backoff: Backoff,
    /// Buffered transition events per subscriber before it starts lagging.
    pub event_capacity: usize,
    /// Capacity of the channel workers report attempt outcomes on.
    pub outcome_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            backoff: Backoff::default(),
            event_capacity: 1024,
            outcome_capacity: 256,
        }
    }
}

impl SchedulerConfig {
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults overlaid with `FANOUT_BACKOFF_BASE_MS` / `FANOUT_BACKOFF_CEILING_MS`.
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(base) = millis_from(&lookup, BACKOFF_BASE_ENV) {
            config.backoff.base = base;
        }
        if let Some(ceiling) = millis_from(&lookup, BACKOFF_CEILING_ENV) {
            config.backoff.ceiling = ceiling;
        }
        config
    }
}

fn millis_from(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(err) => {
            warn!(key, value = %raw, error = %err, "ignoring invalid duration");
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    pub fn backoff_base(mut self, base: Duration) -> Self {
        self.config.backoff.base = base;
        self
    }

    pub fn backoff_ceiling(mut self, ceiling: Duration) -> Self {
        self.config.backoff.ceiling = ceiling;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    pub fn outcome_capacity(mut self, capacity: usize) -> Self {
        self.config.outcome_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}
