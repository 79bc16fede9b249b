//! Tunables the data model leaves as "typical"/implementation-defined.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct EcdbConfig {
    /// Row capacity of a "standard" partition.
    pub standard_partition_capacity: usize,
    /// Row capacity of a "large" partition, for tables expected to hold many rows.
    pub large_partition_capacity: usize,
    /// Id pool: minimum recycled-index queue depth before the oldest entry is reused.
    pub id_recycle_low_water_mark: usize,
    /// Bit width of the generation counter packed into an entity handle.
    pub generation_bits: u32,
    /// Maximum number of simultaneously registered worlds.
    pub max_worlds: usize,
    /// Soft capacity hint; not enforced, used to size initial allocations.
    pub max_live_entities: usize,
    /// Root directory for level-file import/export.
    pub data_dir: PathBuf,
    pub persistence_max_retries: u32,
    pub persistence_retry_delay_ms: u64,
}

impl Default for EcdbConfig {
    fn default() -> Self {
        Self {
            standard_partition_capacity: 256,
            large_partition_capacity: 1024,
            id_recycle_low_water_mark: 1024,
            generation_bits: 10,
            max_worlds: 32,
            max_live_entities: 4_000_000,
            data_dir: PathBuf::from("./levels"),
            persistence_max_retries: 3,
            persistence_retry_delay_ms: 100,
        }
    }
}
