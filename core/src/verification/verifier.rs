//! Post-wipe verification of a finished operation.
//!
//! The verifier re-resolves the wiped volume, sanity-checks the numbers the
//! operation reported and, at the deeper levels, proves the volume still
//! stores and returns data faithfully with a canary file. Internal failures
//! are folded into the report as high-severity anomalies; the only hard error
//! is a disk that can no longer be found.

use super::report::{
    compliance_for, success_rate, Anomaly, AnomalyKind, Severity, VerificationLevel,
    VerificationReport, VERIFIED_THRESHOLD,
};
use crate::control::RunContext;
use crate::crypto::{secure_random_bytes, sha256_hex};
use crate::drives::{resolve_disk, DiskInventory};
use crate::wipe::WipeOperation;
use crate::{DiskTarget, WipeError, WipeResult, MIB};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Throughput above which a reported wipe speed is implausible (MB/s)
pub const MAX_PLAUSIBLE_SPEED_MBPS: f64 = 1000.0;

const ENGINE_LOCATION: &str = "verification_engine";

/// Filesystem residue checks run at the aggressive level.
///
/// Implementations return anomalies for anything that still looks like user
/// data; errors are logged and do not fail the run.
pub trait ResidueScanner: Send + Sync {
    /// Journal and metadata structures (MFT, inode tables)
    fn scan_metadata(&self, root: &Path, ctx: &RunContext) -> WipeResult<Vec<Anomaly>>;

    /// Unallocated space
    fn scan_free_space(&self, root: &Path, ctx: &RunContext) -> WipeResult<Vec<Anomaly>>;
}

/// Scanner that never reports residue. Placeholder until raw-volume scanning
/// is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoResidue;

impl ResidueScanner for NoResidue {
    fn scan_metadata(&self, root: &Path, _ctx: &RunContext) -> WipeResult<Vec<Anomaly>> {
        tracing::info!(disk = %root.display(), "Metadata residue scan (no-op)");
        Ok(Vec::new())
    }

    fn scan_free_space(&self, root: &Path, _ctx: &RunContext) -> WipeResult<Vec<Anomaly>> {
        tracing::info!(disk = %root.display(), "Free-space residue scan (no-op)");
        Ok(Vec::new())
    }
}

/// Outcome of comparing one canary read-back with what was written
#[derive(Debug, Clone, PartialEq)]
pub struct CanaryCheck {
    pub anomaly: Option<Anomaly>,
    /// Bytes that came back different from what was written
    pub recovered: u64,
}

/// Compare a read-back with the canary content.
pub fn compare_canary(expected: &[u8], actual: &[u8], attempt: u32, location: &str) -> CanaryCheck {
    if actual.len() != expected.len() {
        return CanaryCheck {
            anomaly: Some(Anomaly::new(
                AnomalyKind::SizeMismatch,
                Severity::High,
                location,
                format!(
                    "attempt {}: read {} bytes, expected {}",
                    attempt,
                    actual.len(),
                    expected.len()
                ),
            )),
            recovered: actual.len() as u64,
        };
    }

    let mismatched = expected.iter().zip(actual).filter(|(a, b)| a != b).count() as u64;
    if mismatched == 0 {
        return CanaryCheck {
            anomaly: None,
            recovered: 0,
        };
    }

    let first = expected
        .iter()
        .zip(actual)
        .position(|(a, b)| a != b)
        .unwrap_or_default();
    CanaryCheck {
        anomaly: Some(Anomaly::new(
            AnomalyKind::DataCorruption,
            Severity::High,
            location,
            format!(
                "attempt {}: {} byte(s) differ, first at offset {}",
                attempt, mismatched, first
            ),
        )),
        recovered: mismatched,
    }
}

/// Accumulates findings during a run
struct Findings {
    anomalies: Vec<Anomaly>,
    recovery_attempts: u32,
    recovered_data: u64,
    canary_sha256: Option<String>,
}

pub struct PhysicalVerifier {
    inventory: Arc<dyn DiskInventory>,
    level: VerificationLevel,
    scanner: Arc<dyn ResidueScanner>,
    backoff_unit: Duration,
}

impl PhysicalVerifier {
    pub fn new(inventory: Arc<dyn DiskInventory>, level: VerificationLevel) -> Self {
        Self {
            inventory,
            level,
            scanner: Arc::new(NoResidue),
            backoff_unit: Duration::from_secs(1),
        }
    }

    pub fn with_residue_scanner(mut self, scanner: Arc<dyn ResidueScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    /// Base delay between canary read-backs; attempt `n` waits `n` units.
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn level(&self) -> VerificationLevel {
        self.level
    }

    /// Verify a finished wipe operation.
    ///
    /// Returns `Err(DiskNotFound)` only when the operation's disk cannot be
    /// resolved; every other problem ends up in the report.
    pub fn verify(&self, op: &WipeOperation, ctx: &RunContext) -> WipeResult<VerificationReport> {
        let started = Instant::now();
        let disk = resolve_disk(self.inventory.as_ref(), Path::new(&op.disk))?;
        let ctx = ctx.with_timeout(self.level.timeout());

        tracing::info!(
            disk = %op.disk,
            level = %self.level,
            passes = op.passes,
            "Starting wipe verification"
        );

        let mut findings = Findings {
            anomalies: Vec::new(),
            recovery_attempts: 0,
            recovered_data: 0,
            canary_sha256: None,
        };

        if let Err(e) = self.run_checks(op, &disk, &ctx, &mut findings) {
            tracing::warn!(disk = %op.disk, error = %e, "Verification step failed");
            findings.anomalies.push(e.into());
        }

        let rate = success_rate(&findings.anomalies, findings.recovered_data);
        let report = VerificationReport {
            disk: op.disk.clone(),
            method: op.method.to_string(),
            passes: op.passes,
            verification_level: self.level,
            wipe_verified: rate >= VERIFIED_THRESHOLD,
            recovery_attempts: findings.recovery_attempts,
            recovered_data: findings.recovered_data,
            anomalies: findings.anomalies,
            compliance: compliance_for(rate),
            success_rate: rate,
            canary_sha256: findings.canary_sha256,
            test_duration: started.elapsed(),
            test_date: Utc::now(),
        };

        tracing::info!(
            disk = %report.disk,
            verified = report.wipe_verified,
            success_rate = report.success_rate,
            anomalies = report.anomalies.len(),
            "Verification finished"
        );
        Ok(report)
    }

    fn run_checks(
        &self,
        op: &WipeOperation,
        disk: &DiskTarget,
        ctx: &RunContext,
        findings: &mut Findings,
    ) -> WipeResult<()> {
        findings.anomalies.extend(basic_checks(op, disk));

        if !self.level.writes_canary() {
            return Ok(());
        }
        ctx.check()?;
        self.canary_round_trip(&disk.path, ctx, findings)?;

        if self.level == VerificationLevel::Aggressive {
            ctx.check()?;
            self.residue_scans(&disk.path, ctx, findings);
        }
        Ok(())
    }

    fn canary_round_trip(
        &self,
        root: &Path,
        ctx: &RunContext,
        findings: &mut Findings,
    ) -> WipeResult<()> {
        let mut canary = vec![0u8; self.level.buffer_size()];
        secure_random_bytes(&mut canary)?;
        findings.canary_sha256 = Some(sha256_hex(&canary));

        let path = canary_path(root);
        let _guard = CanaryGuard(path.clone());
        fs::write(&path, &canary)?;
        let location = path.display().to_string();

        for attempt in 1..=self.level.max_attempts() {
            ctx.check()?;
            findings.recovery_attempts += 1;

            let anomaly = match fs::read(&path) {
                Ok(actual) => {
                    let check = compare_canary(&canary, &actual, attempt, &location);
                    findings.recovered_data += check.recovered;
                    check.anomaly
                }
                Err(e) => Some(Anomaly::new(
                    AnomalyKind::ReadError,
                    Severity::High,
                    location.as_str(),
                    format!("attempt {}: {}", attempt, e),
                )),
            };

            match anomaly {
                None => {
                    tracing::debug!(attempt, "Canary read back intact");
                    break;
                }
                Some(anomaly) => {
                    tracing::warn!(attempt, kind = ?anomaly.kind, "Canary read-back mismatch");
                    findings.anomalies.push(anomaly);
                }
            }

            if attempt < self.level.max_attempts() {
                ctx.sleep(self.backoff_unit * attempt)?;
            }
        }
        Ok(())
    }

    fn residue_scans(&self, root: &Path, ctx: &RunContext, findings: &mut Findings) {
        match self.scanner.scan_metadata(root, ctx) {
            Ok(found) => findings.anomalies.extend(found),
            Err(e) => tracing::warn!(disk = %root.display(), error = %e, "Metadata scan failed"),
        }
        match self.scanner.scan_free_space(root, ctx) {
            Ok(found) => findings.anomalies.extend(found),
            Err(e) => tracing::warn!(disk = %root.display(), error = %e, "Free-space scan failed"),
        }
    }
}

/// Space and throughput sanity checks against the inventory's view of the disk
pub fn basic_checks(op: &WipeOperation, disk: &DiskTarget) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();

    if disk.free_bytes < op.bytes_wiped {
        anomalies.push(Anomaly::new(
            AnomalyKind::SpaceMismatch,
            Severity::Medium,
            op.disk.as_str(),
            format!(
                "free space {} MiB is less than the {} MiB claimed wiped",
                disk.free_bytes / MIB,
                op.bytes_wiped / MIB
            ),
        ));
    }

    if op.speed_mbps > MAX_PLAUSIBLE_SPEED_MBPS {
        anomalies.push(Anomaly::new(
            AnomalyKind::SpeedAnomaly,
            Severity::Low,
            op.disk.as_str(),
            format!("implausibly high throughput: {:.1} MB/s", op.speed_mbps),
        ));
    }

    anomalies
}

fn canary_path(root: &Path) -> PathBuf {
    root.join(format!(
        "freewipe_verify_{}.tmp",
        uuid::Uuid::new_v4().simple()
    ))
}

/// Removes the canary however the run ends
struct CanaryGuard(PathBuf);

impl Drop for CanaryGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.0) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(canary = %self.0.display(), error = %e, "Failed to remove canary");
            }
        }
    }
}

impl From<WipeError> for Anomaly {
    fn from(err: WipeError) -> Self {
        Anomaly::new(
            AnomalyKind::VerificationError,
            Severity::High,
            ENGINE_LOCATION,
            err.to_string(),
        )
    }
}
