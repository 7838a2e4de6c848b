// Size-classed buffer pool for chunk-sized filler writes

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Smallest pooled size class (1 KiB)
pub const MIN_CLASS: usize = 1024;
/// Largest doubling size class (16 MiB); bigger requests use an overflow class
pub const MAX_CLASS: usize = 16 * 1024 * 1024;
/// Overflow classes are rounded up to this granularity
pub const PAGE_SIZE: usize = 4096;
/// Idle buffers kept per class before extra releases are freed
pub const DEFAULT_MAX_RETAINED: usize = 8;

type Bucket = Arc<Mutex<Vec<Vec<u8>>>>;

/// Map a request size to the capacity of the bucket that serves it.
pub fn size_class(size: usize) -> usize {
    if size <= MIN_CLASS {
        return MIN_CLASS;
    }
    if size <= MAX_CLASS {
        return size.next_power_of_two();
    }
    size.div_ceil(PAGE_SIZE) * PAGE_SIZE
}

/// Reusable byte buffers grouped by size class.
///
/// Shared through an `Arc` by every concurrent session on the host. Buckets are
/// found under a read lock and created under the write lock with a second
/// lookup, so two threads asking for a new class end up sharing one bucket.
pub struct BufferPool {
    buckets: RwLock<HashMap<usize, Bucket>>,
    max_retained: usize,
    counters: Mutex<PoolCounters>,
}

#[derive(Debug, Default, Clone, Copy)]
struct PoolCounters {
    hits: u64,
    misses: u64,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_max_retained(DEFAULT_MAX_RETAINED)
    }

    pub fn with_max_retained(max_retained: usize) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            max_retained,
            counters: Mutex::new(PoolCounters::default()),
        }
    }

    /// Get a zero-filled buffer of exactly `size` bytes.
    ///
    /// A zero-size request returns an empty, unpooled buffer.
    pub fn acquire(&self, size: usize) -> PooledBuffer {
        if size == 0 {
            return PooledBuffer {
                data: Vec::new(),
                len: 0,
                bucket: None,
            };
        }

        let class = size_class(size);
        let bucket = self.bucket(class);
        let reused = bucket.lock().unwrap_or_else(PoisonError::into_inner).pop();

        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let data = match reused {
            Some(buffer) => {
                counters.hits += 1;
                buffer
            }
            None => {
                counters.misses += 1;
                vec![0u8; class]
            }
        };
        drop(counters);

        PooledBuffer {
            data,
            len: size,
            bucket: Some(PoolSlot {
                bucket,
                max_retained: self.max_retained,
            }),
        }
    }

    /// Return a buffer to its bucket. Equivalent to dropping it.
    pub fn release(&self, buffer: PooledBuffer) {
        drop(buffer);
    }

    fn bucket(&self, class: usize) -> Bucket {
        {
            let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(bucket) = buckets.get(&class) {
                return bucket.clone();
            }
        }

        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);
        buckets
            .entry(class)
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone()
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
        let mut retained_buffers = 0;
        let mut retained_bytes = 0;
        for (class, bucket) in buckets.iter() {
            let idle = bucket.lock().unwrap_or_else(PoisonError::into_inner).len();
            retained_buffers += idle;
            retained_bytes += idle * class;
        }
        let counters = *self.counters.lock().unwrap_or_else(PoisonError::into_inner);

        PoolStats {
            classes: buckets.len(),
            retained_buffers,
            retained_bytes,
            hits: counters.hits,
            misses: counters.misses,
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

struct PoolSlot {
    bucket: Bucket,
    max_retained: usize,
}

/// Buffer that zeroes itself and returns to its bucket when dropped
pub struct PooledBuffer {
    data: Vec<u8>,
    len: usize,
    bucket: Option<PoolSlot>,
}

impl PooledBuffer {
    /// Capacity of the backing size class
    pub fn class_size(&self) -> usize {
        self.data.len()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        // Only [..len] was ever exposed, the tail is still zero
        self.data[..self.len].fill(0);

        if let Some(slot) = self.bucket.take() {
            let mut idle = slot.bucket.lock().unwrap_or_else(PoisonError::into_inner);
            if idle.len() < slot.max_retained {
                idle.push(std::mem::take(&mut self.data));
            }
        }
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.data[..self.len]
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.data[..self.len]
    }
}

/// Buffer pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub classes: usize,
    pub retained_buffers: usize,
    pub retained_bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;

    #[test]
    fn test_size_classes() {
        assert_eq!(size_class(1), 1024);
        assert_eq!(size_class(1024), 1024);
        assert_eq!(size_class(1025), 2048);
        assert_eq!(size_class(3 * 1024 * 1024), 4 * 1024 * 1024);
        assert_eq!(size_class(MAX_CLASS), MAX_CLASS);
        assert_eq!(size_class(MAX_CLASS + 1), MAX_CLASS + PAGE_SIZE);
    }

    #[test]
    fn test_acquire_exact_length() {
        let pool = Arc::new(BufferPool::new());
        let buffer = pool.acquire(3000);
        assert_eq!(buffer.len(), 3000);
        assert_eq!(buffer.class_size(), 4096);
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_zero_size_is_noop() {
        let pool = Arc::new(BufferPool::new());
        let buffer = pool.acquire(0);
        assert!(buffer.is_empty());
        pool.release(buffer);

        let stats = pool.stats();
        assert_eq!(stats.classes, 0);
        assert_eq!(stats.retained_buffers, 0);
    }

    #[test]
    fn test_release_zeroes_buffer() {
        let pool = Arc::new(BufferPool::new());

        let mut buffer = pool.acquire(4096);
        buffer.fill(0xAB);
        pool.release(buffer);

        let reused = pool.acquire(4096);
        assert!(reused.iter().all(|&b| b == 0), "reused buffer leaked data");
        assert_eq!(pool.stats().hits, 1);
    }

    #[test]
    fn test_smaller_request_reuses_class_without_stale_tail() {
        let pool = Arc::new(BufferPool::new());

        let mut big = pool.acquire(4000);
        big.fill(0xFF);
        drop(big);

        let mut small = pool.acquire(3000);
        small.fill(0x11);
        drop(small);

        let again = pool.acquire(4096);
        assert!(again.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_retention_is_bounded() {
        let pool = Arc::new(BufferPool::with_max_retained(2));
        let buffers: Vec<_> = (0..5).map(|_| pool.acquire(1024)).collect();
        drop(buffers);

        let stats = pool.stats();
        assert_eq!(stats.retained_buffers, 2);
        assert_eq!(stats.retained_bytes, 2048);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = Arc::new(BufferPool::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let pool = pool.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        let mut buffer = pool.acquire(64 * 1024);
                        assert!(buffer.iter().all(|&b| b == 0));
                        buffer.fill(i as u8 + 1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.classes, 1);
        assert_eq!(stats.hits + stats.misses, 800);
    }

    proptest! {
        #[test]
        fn prop_class_covers_request(size in 1usize..64 * 1024 * 1024) {
            let class = size_class(size);
            prop_assert!(class >= size);
            if size > MAX_CLASS {
                prop_assert_eq!(class % PAGE_SIZE, 0);
                prop_assert!(class - size < PAGE_SIZE);
            } else {
                prop_assert!(class.is_power_of_two());
            }
        }
    }
}
