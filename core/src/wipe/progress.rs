use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Default capacity of the progress channel
pub const DEFAULT_PROGRESS_CAPACITY: usize = 64;

/// Point-in-time view of a running pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub disk: String,
    /// One-based pass number
    pub pass: u32,
    pub total_passes: u32,
    pub bytes_written: u64,
    pub speed_mbps: f64,
    /// Share of the pass's initial free-space estimate written so far
    pub percentage: f64,
    pub current_artifact: Option<PathBuf>,
}

/// Producer half of a bounded progress channel.
///
/// Publishing never blocks: when the consumer falls behind the snapshot is
/// dropped and counted.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: mpsc::Sender<ProgressSnapshot>,
    dropped: Arc<AtomicU64>,
}

impl ProgressSink {
    pub fn publish(&self, snapshot: ProgressSnapshot) {
        match self.tx.try_send(snapshot) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Snapshots discarded because the channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Create a bounded progress channel
pub fn progress_channel(capacity: usize) -> (ProgressSink, mpsc::Receiver<ProgressSnapshot>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ProgressSink {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(bytes: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            disk: "/mnt/data".to_string(),
            pass: 1,
            total_passes: 1,
            bytes_written: bytes,
            speed_mbps: 10.0,
            percentage: 1.0,
            current_artifact: None,
        }
    }

    #[test]
    fn test_full_channel_drops_snapshots() {
        let (sink, mut rx) = progress_channel(2);
        for i in 0..5 {
            sink.publish(snapshot(i));
        }
        assert_eq!(sink.dropped(), 3);

        assert_eq!(rx.try_recv().unwrap().bytes_written, 0);
        assert_eq!(rx.try_recv().unwrap().bytes_written, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (sink, rx) = progress_channel(1);
        drop(rx);
        sink.publish(snapshot(1));
        assert_eq!(sink.dropped(), 0);
    }
}
