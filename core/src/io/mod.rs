pub mod buffer_pool;
pub mod metrics;
pub mod throttled_writer;
pub mod volume;

// Re-exports
pub use buffer_pool::{BufferPool, PoolStats, PooledBuffer};
pub use metrics::{WriteMetrics, WriteStats};
pub use throttled_writer::{is_closed_error, PartialWrite, ThrottledWriter};
pub use volume::{DurableWrite, LocalVolume, Volume};

use crate::StorageClass;

/// I/O chunk size for a storage class, before configured ceilings apply
pub fn chunk_size_for(class: StorageClass) -> usize {
    match class {
        StorageClass::HDD => 2 * 1024 * 1024,   // 2MB
        StorageClass::SSD => 16 * 1024 * 1024,  // 16MB
        StorageClass::Unknown => 4 * 1024 * 1024, // 4MB
    }
}
