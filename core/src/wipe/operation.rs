//! Multi-pass wipe of one disk and the record describing it.

use super::progress::ProgressSink;
use super::session::{SessionParams, SessionReport, SessionState, WipeSession};
use super::system_disk::{SystemDiskOptIn, SystemDiskPolicy};
use crate::algorithms::{FillPattern, OverwriteStrategy};
use crate::config::{WipeConfiguration, WipeEngine, WipeMethod, WipeProfile};
use crate::control::{Interruption, RunContext};
use crate::io::metrics::throughput_mbps;
use crate::io::{BufferPool, Volume};
use crate::{DiskTarget, StorageClass};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Running,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Running)
    }

    /// Status an operation takes when a pass ends in `state`, `None` to keep going
    pub fn after_pass(state: SessionState) -> Option<Self> {
        match state {
            SessionState::Running | SessionState::FullStop => None,
            SessionState::TimedOut => Some(OperationStatus::Partial),
            SessionState::Cancelled => Some(OperationStatus::Cancelled),
            SessionState::DeviceUnavailable | SessionState::WriteFailed => {
                Some(OperationStatus::Failed)
            }
        }
    }

    fn after_interruption(why: Interruption) -> Self {
        match why {
            Interruption::Cancelled => OperationStatus::Cancelled,
            Interruption::DeadlineExceeded => OperationStatus::Partial,
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Running => write!(f, "RUNNING"),
            OperationStatus::Completed => write!(f, "COMPLETED"),
            OperationStatus::Partial => write!(f, "PARTIAL"),
            OperationStatus::Failed => write!(f, "FAILED"),
            OperationStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Outcome record of a wipe operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WipeOperation {
    pub id: Uuid,
    pub disk: String,
    pub disk_class: StorageClass,
    pub system_disk: bool,
    pub engine: WipeEngine,
    pub strategy: OverwriteStrategy,
    pub method: WipeMethod,
    pub profile: WipeProfile,
    /// Passes completed
    pub passes: u32,
    pub target_passes: u32,
    /// Target artifact size in bytes
    pub chunk_size: u64,
    pub status: OperationStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub bytes_wiped: u64,
    pub speed_mbps: f64,
    pub error: Option<String>,
    pub warning: Option<String>,
    pub trimmed: bool,
}

impl WipeOperation {
    fn start(disk: &DiskTarget, config: &WipeConfiguration) -> Self {
        let strategy = OverwriteStrategy::for_engine(config.engine);
        Self {
            id: Uuid::new_v4(),
            disk: disk.name(),
            disk_class: disk.class,
            system_disk: disk.is_system,
            engine: config.engine,
            strategy,
            method: config.method,
            profile: config.profile,
            passes: 0,
            target_passes: strategy.pass_count(config.passes_for(disk.class)),
            chunk_size: strategy.file_size(config.profile, disk.class),
            status: OperationStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            bytes_wiped: 0,
            speed_mbps: 0.0,
            error: None,
            warning: None,
            trimmed: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn add_warning(&mut self, warning: String) {
        if self.is_terminal() {
            return;
        }
        self.warning = Some(match self.warning.take() {
            Some(existing) => format!("{}; {}", existing, warning),
            None => warning,
        });
    }

    /// Reason recorded when a deadline cuts the operation short
    fn deadline_reason(&self, status: OperationStatus) -> Option<String> {
        (status == OperationStatus::Partial).then(|| {
            format!(
                "time limit exceeded after {} of {} passes",
                self.passes, self.target_passes
            )
        })
    }

    /// Move to a terminal status. A terminal record is never changed again.
    fn finish(&mut self, status: OperationStatus, error: Option<String>, started: Instant) {
        if self.is_terminal() {
            tracing::debug!(id = %self.id, "Ignoring transition of finished operation");
            return;
        }
        self.status = status;
        self.error = error;
        self.end_time = Some(Utc::now());
        self.speed_mbps = throughput_mbps(self.bytes_wiped, started.elapsed());
    }
}

/// Runs wipe operations, sharing one buffer pool between them.
#[derive(Clone)]
pub struct WipeRunner {
    pool: Arc<BufferPool>,
    policy: SystemDiskPolicy,
    progress: Option<ProgressSink>,
}

impl WipeRunner {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            pool,
            policy: SystemDiskPolicy::default(),
            progress: None,
        }
    }

    pub fn with_policy(mut self, policy: SystemDiskPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn policy(&self) -> &SystemDiskPolicy {
        &self.policy
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Wipe the free space of `disk` through `volume`.
    ///
    /// Always returns a record; failures are reported through its status and
    /// error fields rather than as an `Err`.
    pub fn run(
        &self,
        disk: &DiskTarget,
        volume: &dyn Volume,
        config: &WipeConfiguration,
        opt_in: SystemDiskOptIn,
        ctx: &RunContext,
    ) -> WipeOperation {
        let started = Instant::now();
        let mut op = WipeOperation::start(disk, config);

        tracing::info!(
            id = %op.id,
            disk = %op.disk,
            class = %disk.class,
            engine = %config.engine,
            strategy = %op.strategy,
            passes = op.target_passes,
            "Starting wipe operation"
        );

        if let Err(e) = config.validate() {
            op.finish(OperationStatus::Failed, Some(e.to_string()), started);
            return op;
        }

        let limits = match self.policy.preflight(disk, opt_in, volume.artifact_dir()) {
            Ok(limits) => limits,
            Err(e) => {
                tracing::warn!(disk = %op.disk, error = %e, "Wipe refused");
                op.finish(OperationStatus::Failed, Some(e.to_string()), started);
                return op;
            }
        };

        let mut op_ctx = ctx.clone();
        match config.max_duration() {
            Ok(Some(limit)) => op_ctx = op_ctx.with_timeout(limit),
            Ok(None) => {}
            Err(e) => {
                op.finish(OperationStatus::Failed, Some(e.to_string()), started);
                return op;
            }
        }
        if let Some(limits) = &limits {
            op_ctx = op_ctx.with_timeout(limits.timeout);
        }

        if let Err(e) = volume.probe_writable() {
            op.finish(
                OperationStatus::Failed,
                Some(format!("pre-flight write test failed: {}", e)),
                started,
            );
            return op;
        }

        let free_space = match &limits {
            Some(limits) => disk.free_bytes.min(limits.max_free_bytes),
            None => disk.free_bytes,
        };
        let chunk_ceiling = match &limits {
            Some(limits) => config.chunk_size.min(limits.max_chunk_bytes),
            None => config.chunk_size,
        };

        for pass in 0..op.target_passes {
            if let Err(why) = op_ctx.check() {
                let status = OperationStatus::after_interruption(why);
                let reason = op.deadline_reason(status);
                op.finish(status, reason, started);
                break;
            }

            let params = SessionParams {
                pass,
                total_passes: op.target_passes,
                pattern: FillPattern::for_pass(op.strategy, config.method, pass),
                strategy: op.strategy,
                profile: config.profile,
                throttle_mbps: config.max_speed_mbps,
                file_delay: config.file_delay(),
                chunk_ceiling,
                free_space_estimate: free_space,
            };

            let report = WipeSession::new(disk, volume, self.pool.clone(), params)
                .with_progress(self.progress.clone())
                .run(&op_ctx);
            self.record_pass(&mut op, &report, started);

            if op.is_terminal() {
                break;
            }
        }

        if !op.is_terminal() {
            self.maybe_trim(&mut op, disk, volume, config);
            op.finish(OperationStatus::Completed, None, started);
        }

        tracing::info!(
            id = %op.id,
            disk = %op.disk,
            status = %op.status,
            passes = op.passes,
            bytes = op.bytes_wiped,
            speed_mbps = op.speed_mbps,
            "Wipe operation finished"
        );
        op
    }

    fn record_pass(&self, op: &mut WipeOperation, report: &SessionReport, started: Instant) {
        op.bytes_wiped += report.bytes_written;

        if report.cleanup_failures > 0 {
            op.add_warning(format!(
                "{} filler artifact(s) could not be removed",
                report.cleanup_failures
            ));
        }

        match OperationStatus::after_pass(report.state) {
            None => op.passes += 1,
            Some(status) => {
                let error = report
                    .error
                    .clone()
                    .or_else(|| op.deadline_reason(status));
                op.finish(status, error, started);
            }
        }
    }

    fn maybe_trim(
        &self,
        op: &mut WipeOperation,
        disk: &DiskTarget,
        volume: &dyn Volume,
        config: &WipeConfiguration,
    ) {
        if !config.enable_trim || !disk.class.is_solid_state() {
            return;
        }
        match volume.trim() {
            Ok(()) => {
                op.trimmed = true;
                tracing::info!(disk = %op.disk, "TRIM completed");
            }
            Err(e) => {
                tracing::warn!(disk = %op.disk, error = %e, "TRIM failed");
                op.add_warning(format!("TRIM failed: {}", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GIB;

    #[test]
    fn test_status_after_pass() {
        let cases = vec![
            (SessionState::FullStop, None),
            (SessionState::TimedOut, Some(OperationStatus::Partial)),
            (SessionState::Cancelled, Some(OperationStatus::Cancelled)),
            (SessionState::DeviceUnavailable, Some(OperationStatus::Failed)),
            (SessionState::WriteFailed, Some(OperationStatus::Failed)),
        ];
        for (state, expected) in cases {
            assert_eq!(OperationStatus::after_pass(state), expected, "{:?}", state);
        }
    }

    #[test]
    fn test_terminal_record_is_frozen() {
        let disk = DiskTarget::new("/mnt/data", StorageClass::HDD, 10 * GIB, 5 * GIB);
        let mut op = WipeOperation::start(&disk, &WipeConfiguration::default());
        let started = Instant::now();

        op.finish(OperationStatus::Cancelled, None, started);
        let end_time = op.end_time;
        op.finish(OperationStatus::Completed, Some("late".into()), started);
        op.add_warning("late warning".into());

        assert_eq!(op.status, OperationStatus::Cancelled);
        assert_eq!(op.end_time, end_time);
        assert!(op.error.is_none());
        assert!(op.warning.is_none());
    }

    #[test]
    fn test_deadline_reason_only_for_partial() {
        let disk = DiskTarget::new("/mnt/data", StorageClass::HDD, 10 * GIB, 5 * GIB);
        let mut op = WipeOperation::start(&disk, &WipeConfiguration::default());
        op.passes = 1;
        op.target_passes = 3;

        assert_eq!(
            op.deadline_reason(OperationStatus::Partial).as_deref(),
            Some("time limit exceeded after 1 of 3 passes")
        );
        assert!(op.deadline_reason(OperationStatus::Cancelled).is_none());
    }

    #[test]
    fn test_record_targets_follow_strategy() {
        let disk = DiskTarget::new("/mnt/ssd", StorageClass::SSD, 10 * GIB, 5 * GIB);
        let config = WipeConfiguration {
            engine: WipeEngine::Cipher,
            ..WipeConfiguration::default()
        };
        let op = WipeOperation::start(&disk, &config);
        assert_eq!(op.target_passes, 3);
        assert_eq!(op.chunk_size, 32 * GIB);
        assert_eq!(op.status, OperationStatus::Running);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&OperationStatus::Partial).unwrap();
        assert_eq!(json, "\"PARTIAL\"");
    }
}
