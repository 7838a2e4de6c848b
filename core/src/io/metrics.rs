// Throughput tracking for filler writes

use std::time::{Duration, Instant};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Running counters for one session's writes
#[derive(Debug, Clone)]
pub struct WriteMetrics {
    start_time: Instant,
    bytes_written: u64,
    chunks_written: u64,
    syncs: u64,
    slowest_chunk: Duration,
}

impl WriteMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            bytes_written: 0,
            chunks_written: 0,
            syncs: 0,
            slowest_chunk: Duration::ZERO,
        }
    }

    /// Record a chunk accepted by the writer
    pub fn record_chunk(&mut self, bytes: u64, latency: Duration) {
        self.bytes_written += bytes;
        self.chunks_written += 1;
        if latency > self.slowest_chunk {
            self.slowest_chunk = latency;
        }
    }

    /// Record bytes accepted by a write that then failed
    pub fn record_partial(&mut self, bytes: u64) {
        self.bytes_written += bytes;
    }

    pub fn record_sync(&mut self) {
        self.syncs += 1;
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average throughput in MB/s since the tracker was created
    pub fn throughput_mbps(&self) -> f64 {
        throughput_mbps(self.bytes_written, self.elapsed())
    }

    pub fn stats(&self) -> WriteStats {
        WriteStats {
            elapsed: self.elapsed(),
            bytes_written: self.bytes_written,
            chunks_written: self.chunks_written,
            syncs: self.syncs,
            throughput_mbps: self.throughput_mbps(),
            slowest_chunk: self.slowest_chunk,
        }
    }
}

impl Default for WriteMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// MB/s for `bytes` over `elapsed`, zero for sub-millisecond spans.
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs < 0.001 {
        return 0.0;
    }
    bytes as f64 / BYTES_PER_MB / secs
}

/// Write statistics snapshot
#[derive(Debug, Clone)]
pub struct WriteStats {
    pub elapsed: Duration,
    pub bytes_written: u64,
    pub chunks_written: u64,
    pub syncs: u64,
    pub throughput_mbps: f64,
    pub slowest_chunk: Duration,
}

impl WriteStats {
    /// Format throughput in human-readable form
    pub fn throughput_human(&self) -> String {
        if self.throughput_mbps >= 1000.0 {
            format!("{:.2} GB/s", self.throughput_mbps / 1024.0)
        } else {
            format!("{:.2} MB/s", self.throughput_mbps)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput_formula() {
        let mbps = throughput_mbps(100 * 1024 * 1024, Duration::from_secs(4));
        assert!((mbps - 25.0).abs() < f64::EPSILON);
        assert_eq!(throughput_mbps(1024, Duration::from_micros(10)), 0.0);
    }

    #[test]
    fn test_record_chunks() {
        let mut metrics = WriteMetrics::new();
        metrics.record_chunk(4096, Duration::from_millis(2));
        metrics.record_chunk(4096, Duration::from_millis(5));
        metrics.record_partial(100);
        metrics.record_sync();

        let stats = metrics.stats();
        assert_eq!(stats.bytes_written, 8292);
        assert_eq!(stats.chunks_written, 2);
        assert_eq!(stats.syncs, 1);
        assert_eq!(stats.slowest_chunk, Duration::from_millis(5));
    }

    #[test]
    fn test_throughput_human() {
        let stats = WriteStats {
            elapsed: Duration::from_secs(1),
            bytes_written: 0,
            chunks_written: 0,
            syncs: 0,
            throughput_mbps: 2048.0,
            slowest_chunk: Duration::ZERO,
        };
        assert_eq!(stats.throughput_human(), "2.00 GB/s");
    }
}
