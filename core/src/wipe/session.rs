//! One overwrite pass over a volume's free space.
//!
//! A session keeps creating filler artifacts until the volume reports it is
//! full, the free-space estimate drops under the strategy floor, or something
//! stops it. Whatever happens, every artifact it created is deleted before
//! [`WipeSession::run`] returns.

use super::progress::{ProgressSink, ProgressSnapshot};
use crate::algorithms::{FillPattern, OverwriteStrategy, PatternFiller};
use crate::config::WipeProfile;
use crate::control::{Interruption, RunContext};
use crate::error::{classify_io_error, WriteFailureClass};
use crate::io::{chunk_size_for, BufferPool, PartialWrite, ThrottledWriter, Volume, WriteMetrics, WriteStats};
use crate::{DiskTarget, GIB};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Smallest artifact a session creates (before clamping to free space)
pub const MIN_ARTIFACT_SIZE: u64 = GIB;
/// Largest artifact a session creates
pub const MAX_ARTIFACT_SIZE: u64 = 50 * GIB;
/// Consecutive unchanged free-space estimates tolerated before giving up
pub const STUCK_LIMIT: u32 = 3;

/// Lifecycle of a session. Everything but `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Running,
    /// Free space exhausted; the pass succeeded
    FullStop,
    TimedOut,
    Cancelled,
    DeviceUnavailable,
    WriteFailed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Running)
    }

    fn from_interruption(why: Interruption) -> Self {
        match why {
            Interruption::Cancelled => SessionState::Cancelled,
            Interruption::DeadlineExceeded => SessionState::TimedOut,
        }
    }
}

/// Inputs for one pass
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Zero-based pass index
    pub pass: u32,
    pub total_passes: u32,
    pub pattern: FillPattern,
    pub strategy: OverwriteStrategy,
    pub profile: WipeProfile,
    /// 0 disables throttling
    pub throttle_mbps: f64,
    pub file_delay: Duration,
    /// Upper bound on the storage-class chunk size
    pub chunk_ceiling: u64,
    /// Free bytes the pass may fill
    pub free_space_estimate: u64,
}

/// Result of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub state: SessionState,
    pub bytes_written: u64,
    pub artifacts_created: usize,
    /// Artifacts that could not be deleted during cleanup
    pub cleanup_failures: usize,
    pub error: Option<String>,
    pub stats: WriteStats,
}

/// Pick an artifact size in `[1 GiB, min(strategy size, free/20, 50 GiB)]`,
/// clamped to the free space left.
pub fn pick_artifact_size<R: Rng + ?Sized>(strategy_size: u64, free: u64, rng: &mut R) -> u64 {
    let lower = MIN_ARTIFACT_SIZE;
    let upper = strategy_size.min(free / 20).min(MAX_ARTIFACT_SIZE).max(lower);
    let size = if upper > lower {
        rng.gen_range(lower..=upper)
    } else {
        lower
    };
    size.min(free)
}

/// Short random tag that groups one session's artifact names
pub fn artifact_tag() -> String {
    let mut buf = uuid::Uuid::encode_buffer();
    uuid::Uuid::new_v4().simple().encode_lower(&mut buf)[..8].to_string()
}

/// Detects a loop that keeps running without the free-space estimate moving.
#[derive(Debug)]
pub struct StuckDetector {
    last: Option<u64>,
    repeats: u32,
    limit: u32,
}

impl StuckDetector {
    pub fn new(limit: u32) -> Self {
        Self {
            last: None,
            repeats: 0,
            limit,
        }
    }

    /// Record an estimate; true once it has been unchanged `limit` times in a row.
    pub fn observe(&mut self, estimate: u64) -> bool {
        if self.last == Some(estimate) {
            self.repeats += 1;
        } else {
            self.last = Some(estimate);
            self.repeats = 0;
        }
        self.repeats >= self.limit
    }
}

/// Artifacts created by a session, deleted on `clear()` or drop.
struct ArtifactLedger<'a> {
    volume: &'a dyn Volume,
    paths: Vec<PathBuf>,
    created: usize,
}

impl<'a> ArtifactLedger<'a> {
    fn new(volume: &'a dyn Volume) -> Self {
        Self {
            volume,
            paths: Vec::new(),
            created: 0,
        }
    }

    fn register(&mut self, path: PathBuf) {
        self.paths.push(path);
        self.created += 1;
    }

    fn created(&self) -> usize {
        self.created
    }

    /// Delete every registered artifact, returning how many could not be removed.
    fn clear(&mut self) -> usize {
        let mut failures = 0;
        for path in self.paths.drain(..) {
            match self.volume.remove_artifact(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    failures += 1;
                    tracing::warn!(artifact = %path.display(), error = %e, "Failed to remove filler artifact");
                }
            }
        }
        failures
    }
}

impl Drop for ArtifactLedger<'_> {
    fn drop(&mut self) {
        if !self.paths.is_empty() {
            self.clear();
        }
    }
}

/// Why writing a single artifact stopped early
enum ArtifactEnd {
    VolumeFull,
    Interrupted(Interruption),
    DeviceUnavailable(String),
    Failed(String),
}

/// One pass of filling a volume's free space
pub struct WipeSession<'a> {
    disk: &'a DiskTarget,
    volume: &'a dyn Volume,
    pool: Arc<BufferPool>,
    progress: Option<ProgressSink>,
    params: SessionParams,
    ledger: ArtifactLedger<'a>,
    metrics: WriteMetrics,
    free_estimate: u64,
    tag: String,
}

impl<'a> WipeSession<'a> {
    pub fn new(
        disk: &'a DiskTarget,
        volume: &'a dyn Volume,
        pool: Arc<BufferPool>,
        params: SessionParams,
    ) -> Self {
        let tag = artifact_tag();
        Self {
            disk,
            volume,
            pool,
            progress: None,
            free_estimate: params.free_space_estimate,
            params,
            ledger: ArtifactLedger::new(volume),
            metrics: WriteMetrics::new(),
            tag,
        }
    }

    pub fn with_progress(mut self, progress: Option<ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    fn chunk_size(&self) -> usize {
        let ceiling = usize::try_from(self.params.chunk_ceiling).unwrap_or(usize::MAX);
        chunk_size_for(self.disk.class).min(ceiling).max(1)
    }

    fn artifact_path(&self, index: usize) -> PathBuf {
        self.volume.artifact_dir().join(format!(
            "freewipe_{}_p{}_{:04}.tmp",
            self.tag,
            self.params.pass + 1,
            index
        ))
    }

    /// Run the pass to a terminal state and clean up.
    pub fn run(mut self, ctx: &RunContext) -> SessionReport {
        tracing::info!(
            disk = %self.disk.name(),
            pass = self.params.pass + 1,
            total_passes = self.params.total_passes,
            pattern = %self.params.pattern,
            strategy = %self.params.strategy,
            free_bytes = self.free_estimate,
            "Starting overwrite pass"
        );

        let (state, error) = self.fill(ctx);
        let cleanup_failures = self.ledger.clear();
        let stats = self.metrics.stats();

        tracing::info!(
            disk = %self.disk.name(),
            pass = self.params.pass + 1,
            state = ?state,
            bytes = stats.bytes_written,
            artifacts = self.ledger.created(),
            throughput = %stats.throughput_human(),
            "Overwrite pass finished"
        );

        SessionReport {
            state,
            bytes_written: stats.bytes_written,
            artifacts_created: self.ledger.created(),
            cleanup_failures,
            error,
            stats,
        }
    }

    fn fill(&mut self, ctx: &RunContext) -> (SessionState, Option<String>) {
        let mut filler = match PatternFiller::new(self.params.pattern) {
            Ok(filler) => filler,
            Err(e) => return (SessionState::WriteFailed, Some(e.to_string())),
        };
        let strategy = self.params.strategy;
        let target_size = strategy.file_size(self.params.profile, self.disk.class);
        let mut stuck = StuckDetector::new(STUCK_LIMIT);
        let mut rng = rand::thread_rng();

        while self.free_estimate > strategy.min_free_space() {
            if self.ledger.created() >= strategy.max_files() {
                tracing::info!(max_files = strategy.max_files(), "Artifact limit reached");
                break;
            }
            if let Err(why) = ctx.check() {
                return (SessionState::from_interruption(why), None);
            }

            let size = pick_artifact_size(target_size, self.free_estimate, &mut rng);
            match self.write_artifact(size, &mut filler, ctx) {
                Ok(written) => {
                    self.free_estimate = self.free_estimate.saturating_sub(written);
                }
                Err(ArtifactEnd::VolumeFull) => {
                    tracing::info!(disk = %self.disk.name(), "Volume full, free space exhausted");
                    return (SessionState::FullStop, None);
                }
                Err(ArtifactEnd::Interrupted(why)) => {
                    return (SessionState::from_interruption(why), None);
                }
                Err(ArtifactEnd::DeviceUnavailable(msg)) => {
                    tracing::error!(disk = %self.disk.name(), error = %msg, "Device not ready");
                    return (SessionState::DeviceUnavailable, Some(msg));
                }
                Err(ArtifactEnd::Failed(msg)) => {
                    tracing::error!(disk = %self.disk.name(), error = %msg, "Write failed");
                    return (SessionState::WriteFailed, Some(msg));
                }
            }

            if stuck.observe(self.free_estimate) {
                tracing::warn!(
                    disk = %self.disk.name(),
                    free_estimate = self.free_estimate,
                    "Free-space estimate stopped moving, ending pass"
                );
                break;
            }

            if !self.params.file_delay.is_zero()
                && self.free_estimate > strategy.min_free_space()
            {
                if let Err(why) = ctx.sleep(self.params.file_delay) {
                    return (SessionState::from_interruption(why), None);
                }
            }
        }

        (SessionState::FullStop, None)
    }

    fn classify(&self, err: &io::Error, ctx: &RunContext) -> ArtifactEnd {
        if err.kind() == io::ErrorKind::Interrupted {
            if let Err(why) = ctx.check() {
                return ArtifactEnd::Interrupted(why);
            }
        }
        let root = PartialWrite::root_cause(err);
        match classify_io_error(root) {
            WriteFailureClass::VolumeFull => ArtifactEnd::VolumeFull,
            WriteFailureClass::DeviceNotReady => ArtifactEnd::DeviceUnavailable(root.to_string()),
            WriteFailureClass::Fatal => ArtifactEnd::Failed(root.to_string()),
        }
    }

    fn publish(&self, artifact: &Path) {
        let Some(progress) = &self.progress else {
            return;
        };
        let bytes = self.metrics.bytes_written();
        let initial = self.params.free_space_estimate.max(1);
        progress.publish(ProgressSnapshot {
            disk: self.disk.name(),
            pass: self.params.pass + 1,
            total_passes: self.params.total_passes,
            bytes_written: bytes,
            speed_mbps: self.metrics.throughput_mbps(),
            percentage: (bytes as f64 / initial as f64 * 100.0).min(100.0),
            current_artifact: Some(artifact.to_path_buf()),
        });
    }

    fn write_artifact(
        &mut self,
        size: u64,
        filler: &mut PatternFiller,
        ctx: &RunContext,
    ) -> Result<u64, ArtifactEnd> {
        let path = self.artifact_path(self.ledger.created());
        self.ledger.register(path.clone());

        let handle = self
            .volume
            .create_artifact(&path)
            .map_err(|e| self.classify(&e, ctx))?;
        let writer = ThrottledWriter::new(handle, self.params.throttle_mbps).with_context(ctx.clone());

        let chunk_len = (self.chunk_size() as u64).min(size) as usize;
        let mut buffer = self.pool.acquire(chunk_len);
        let constant = filler.pattern().is_constant();
        if constant {
            filler
                .fill(&mut buffer)
                .map_err(|e| ArtifactEnd::Failed(e.to_string()))?;
        }

        let sync_interval = self.params.strategy.sync_interval();
        let mut written = 0u64;
        let mut since_sync = 0u64;

        let result = loop {
            if written >= size {
                break Ok(());
            }
            if let Err(why) = ctx.check() {
                break Err(ArtifactEnd::Interrupted(why));
            }

            let n = (size - written).min(chunk_len as u64) as usize;
            if !constant {
                if let Err(e) = filler.fill(&mut buffer[..n]) {
                    break Err(ArtifactEnd::Failed(e.to_string()));
                }
            }

            let started = Instant::now();
            match writer.write(&buffer[..n]) {
                Ok(accepted) => {
                    written += accepted as u64;
                    since_sync += accepted as u64;
                    self.metrics.record_chunk(accepted as u64, started.elapsed());
                }
                Err(e) => {
                    let partial = PartialWrite::bytes_written(&e) as u64;
                    written += partial;
                    self.metrics.record_partial(partial);
                    break Err(self.classify(&e, ctx));
                }
            }

            if since_sync >= sync_interval {
                if let Err(e) = writer.sync() {
                    break Err(self.classify(&e, ctx));
                }
                self.metrics.record_sync();
                since_sync = 0;
            }

            self.publish(&path);
        };

        let result = match result {
            Ok(()) => match writer.sync() {
                Ok(()) => {
                    self.metrics.record_sync();
                    Ok(())
                }
                Err(e) => Err(self.classify(&e, ctx)),
            },
            Err(end) => Err(end),
        };

        if let Err(e) = writer.close() {
            tracing::debug!(artifact = %path.display(), error = %e, "Closing artifact failed");
        }
        self.pool.release(buffer);

        tracing::debug!(artifact = %path.display(), bytes = written, "Artifact written");
        result.map(|()| written)
    }
}
