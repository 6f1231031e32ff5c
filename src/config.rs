use crate::{Error, Topology};

/// Run-time settings every lock is created against.
///
/// A `Config` is built once before worker threads are spawned and shared
/// with all of them, see [`init_lock_array_global`] and
/// [`init_lock_array_local`].
///
/// # Examples
///
/// ```
/// use slock::{Config, Topology};
///
/// let config = Config::builder()
///     .topology(Topology::uniform(2, 4))
///     .batch_size(64)
///     .pin_threads(false)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.max_threads(), 8);
/// ```
///
/// [`init_lock_array_global`]: crate::init_lock_array_global
/// [`init_lock_array_local`]: crate::init_lock_array_local
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    topology: Topology,
    max_threads: usize,
    batch_size: u32,
    pin_threads: bool,
}

impl Config {
    /// Number of local tickets an HTLock cluster may hand out before the
    /// global lock has to be released.
    pub const DEFAULT_BATCH_SIZE: u32 = 128;

    /// Returns a builder with default settings.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Machine layout used for pinning and cluster lookups.
    #[must_use]
    pub const fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Maximum number of threads that may participate in one lock.
    ///
    /// Queue locks size their node arenas and slot arrays with it.
    #[must_use]
    pub const fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// HTLock batch size.
    #[must_use]
    pub const fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Whether local initialization pins the calling thread.
    #[must_use]
    pub const fn pin_threads(&self) -> bool {
        self.pin_threads
    }

    fn validate(&self) -> Result<(), Error> {
        if self.max_threads == 0 {
            return Err(Error::InvalidConfig("max_threads must be positive"));
        }
        // Queue locks address their nodes with `u32` indices, one of which
        // is reserved.
        if self.max_threads >= u32::MAX as usize {
            return Err(Error::InvalidConfig("max_threads is too large"));
        }
        if self.batch_size == 0 || self.batch_size >= i32::MAX as u32 {
            return Err(Error::InvalidConfig("batch_size out of range"));
        }
        if self.topology.clusters() > usize::from(u8::MAX) - 1 {
            return Err(Error::InvalidConfig("too many clusters"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let topology = Topology::detect();
        let max_threads = topology.cores();
        Self { topology, max_threads, batch_size: Self::DEFAULT_BATCH_SIZE, pin_threads: true }
    }
}

/// A builder for [`Config`].
#[derive(Debug, Default, Clone)]
pub struct ConfigBuilder {
    topology: Option<Topology>,
    max_threads: Option<usize>,
    batch_size: Option<u32>,
    pin_threads: Option<bool>,
}

impl ConfigBuilder {
    /// Machine layout, detected from the process affinity set by default.
    #[must_use]
    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = Some(topology);
        self
    }

    /// Maximum number of participants, the number of topology cores by
    /// default.
    #[must_use]
    pub const fn max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = Some(max_threads);
        self
    }

    /// HTLock batch size, [`Config::DEFAULT_BATCH_SIZE`] by default.
    #[must_use]
    pub const fn batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Whether to pin threads at local initialization, `true` by default.
    #[must_use]
    pub const fn pin_threads(mut self, pin_threads: bool) -> Self {
        self.pin_threads = Some(pin_threads);
        self
    }

    /// Validates and builds the configuration.
    pub fn build(self) -> Result<Config, Error> {
        let topology = self.topology.unwrap_or_default();
        let config = Config {
            max_threads: self.max_threads.unwrap_or_else(|| topology.cores()),
            batch_size: self.batch_size.unwrap_or(Config::DEFAULT_BATCH_SIZE),
            pin_threads: self.pin_threads.unwrap_or(true),
            topology,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::Config;
    use crate::{Error, Topology};

    #[test]
    fn defaults() {
        let config = Config::builder().topology(Topology::uniform(1, 3)).build().unwrap();
        assert_eq!(config.max_threads(), 3);
        assert_eq!(config.batch_size(), Config::DEFAULT_BATCH_SIZE);
        assert!(config.pin_threads());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let topology = Topology::uniform(1, 1);
        let err = Config::builder().topology(topology.clone()).max_threads(0).build();
        assert_eq!(err, Err(Error::InvalidConfig("max_threads must be positive")));
        let err = Config::builder().topology(topology).batch_size(0).build();
        assert_eq!(err, Err(Error::InvalidConfig("batch_size out of range")));
    }
}
