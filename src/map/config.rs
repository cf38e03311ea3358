//! Construction options for [`SyncMap`](super::SyncMap)

/// Default capacity of the dirty tier when it is first built
pub const DEFAULT_CAPACITY: usize = 16;

/// Options applied when a map is created
///
/// # Examples
///
/// ```rust
/// use syncmap::{MapConfig, SyncMap};
///
/// let config = MapConfig::default()
///     .with_initial_capacity(1024)
///     .with_metrics(true);
/// let map: SyncMap<u64, String> = SyncMap::with_config(config);
/// assert!(map.is_empty());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapConfig {
    /// Number of entries the dirty tier is sized for when first allocated
    pub initial_capacity: usize,
    /// Whether operation metrics are recorded from the start
    pub metrics_enabled: bool,
}

impl MapConfig {
    /// Set the initial capacity
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Enable or disable metrics collection
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_CAPACITY,
            metrics_enabled: false,
        }
    }
}
