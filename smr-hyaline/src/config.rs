use smr_core::env_param;

/// Tunables for the Hyaline engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of slots the retired lists are partitioned across. Threads
    /// map to slots by stable index modulo this count.
    ///
    /// Overridden by `SMR_HYALINE_SLOTS`.
    pub slots: usize,
    /// Retirements accumulated before a batch is published. One is plain
    /// Hyaline; larger values give the batched Hyaline-S behavior.
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            slots: 32,
            batch_size: 1,
        }
    }
}

impl Config {
    /// The default configuration with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Config::default();
        if let Some(slots) = env_param::<usize>("SMR_HYALINE_SLOTS") {
            config.slots = slots;
        }
        config
    }

    pub(crate) fn validate(&self) {
        assert!(self.slots > 0, "slot count must be positive");
        assert!(self.batch_size > 0, "batch size must be positive");
    }
}
