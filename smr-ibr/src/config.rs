use std::time::Duration;

use smr_core::{env_param, Epoch};

/// Tunables for the interval-based engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Retirements between drains of the thread-local retired list.
    ///
    /// Overridden by `SMR_RETIRE_BATCH`.
    pub retire_batch: usize,
    /// Retirements between opportunistic clock ticks.
    pub epoch_freq: usize,
    /// Retired-list length that forces a drain when an operation ends.
    pub high_watermark: usize,
    /// Interval of the background clock ticker; `None` leaves advancement
    /// entirely to the opportunistic path.
    ///
    /// Set (in milliseconds) by `SMR_EPOCH_INTERVAL_MS`.
    pub tick_interval: Option<Duration>,
    /// Epoch the clock starts at.
    pub first_epoch: Epoch,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            retire_batch: 10,
            epoch_freq: 100,
            high_watermark: 64,
            tick_interval: None,
            first_epoch: 0,
        }
    }
}

impl Config {
    /// The default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Some(batch) = env_param::<usize>("SMR_RETIRE_BATCH") {
            config.retire_batch = batch;
        }
        if let Some(millis) = env_param::<u64>("SMR_EPOCH_INTERVAL_MS") {
            config.tick_interval = Some(Duration::from_millis(millis));
        }
        config
    }

    pub(crate) fn validate(&self) {
        assert!(self.retire_batch > 0, "retire batch must be positive");
        assert!(self.epoch_freq > 0, "epoch tick frequency must be positive");
    }
}
