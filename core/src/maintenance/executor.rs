//! Production phase executor: cleans directories, wipes and optimizes the
//! volumes the inventory reports, and verifies the last wipe.

use super::cleanup::{clean_paths, CleanupTargets};
use super::orchestrator::PhaseExecutor;
use super::plan::MaintenancePhase;
use crate::config::{AppSettings, SecuritySettings, WipeConfiguration};
use crate::control::RunContext;
use crate::drives::{DiskInventory, TrimOperations};
use crate::io::{BufferPool, LocalVolume};
use crate::verification::{PhysicalVerifier, VerificationLevel};
use crate::wipe::{OperationStatus, SystemDiskOptIn, WipeOperation, WipeRunner};
use crate::{DiskTarget, StorageClass, WipeError, WipeResult};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

pub struct SystemPhaseExecutor {
    inventory: Arc<dyn DiskInventory>,
    wipe: WipeConfiguration,
    security: SecuritySettings,
    verification_level: VerificationLevel,
    targets: CleanupTargets,
    runner: WipeRunner,
    history: Mutex<Vec<WipeOperation>>,
    dry_run: bool,
}

impl SystemPhaseExecutor {
    pub fn new(inventory: Arc<dyn DiskInventory>, settings: &AppSettings) -> Self {
        Self {
            inventory,
            wipe: settings.wipe.clone(),
            security: settings.security.clone(),
            verification_level: settings.verification.level,
            targets: CleanupTargets::platform_default(),
            runner: WipeRunner::new(Arc::new(BufferPool::new())),
            history: Mutex::new(Vec::new()),
            dry_run: false,
        }
    }

    pub fn with_targets(mut self, targets: CleanupTargets) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_runner(mut self, runner: WipeRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Count what would be cleaned and skip wiping and optimizing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Seed the history the verify phase reads from.
    pub fn record_operation(&self, op: WipeOperation) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(op);
    }

    pub fn history(&self) -> Vec<WipeOperation> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn last_operation(&self) -> Option<WipeOperation> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    fn opt_in(&self) -> SystemDiskOptIn {
        SystemDiskOptIn {
            allow_system_disk: self.security.allow_system_disk,
            force_wipe_ssd: self.security.force_wipe_ssd,
        }
    }

    fn should_wipe(&self, disk: &DiskTarget) -> bool {
        if self.security.excluded_disks.iter().any(|p| p == &disk.path) {
            tracing::info!(disk = %disk.name(), "Skipping excluded disk");
            return false;
        }
        if !disk.is_writable {
            tracing::info!(disk = %disk.name(), "Skipping read-only disk");
            return false;
        }
        if disk.is_system && !self.security.allow_system_disk {
            tracing::info!(disk = %disk.name(), "Skipping system disk");
            return false;
        }
        true
    }

    fn roots_for(&self, phase: MaintenancePhase) -> Vec<PathBuf> {
        match phase {
            MaintenancePhase::CleanTemp => self.targets.temp.clone(),
            MaintenancePhase::CleanUpdateCache => self.targets.update_cache.clone(),
            MaintenancePhase::CleanBrowsers => self.targets.browser_roots(),
            _ => Vec::new(),
        }
    }

    async fn clean(self: Arc<Self>, phase: MaintenancePhase, ctx: RunContext) -> WipeResult<u64> {
        tokio::task::spawn_blocking(move || {
            let roots = self.roots_for(phase);
            clean_paths(&roots, self.dry_run, &ctx).map(|summary| summary.bytes_removed)
        })
        .await
        .map_err(|e| WipeError::PhaseFailed(format!("{} task failed: {}", phase, e)))?
    }

    /// System-disk artifacts go to an allow-listed directory, preferably on that disk
    fn volume_for(&self, disk: &DiskTarget) -> LocalVolume {
        let dir = if disk.is_system {
            self.runner
                .policy()
                .artifact_dir(disk, self.inventory.as_ref())
                .unwrap_or_else(|| disk.path.clone())
        } else {
            disk.path.clone()
        };
        LocalVolume::new(dir, disk.class)
    }

    fn wipe_disk(&self, disk: &DiskTarget, ctx: &RunContext) -> WipeOperation {
        let volume = self.volume_for(disk);
        let op = self
            .runner
            .run(disk, &volume, &self.wipe, self.opt_in(), ctx);
        self.record_operation(op.clone());
        op
    }

    async fn wipe_free_space(self: Arc<Self>, ctx: RunContext) -> WipeResult<u64> {
        let disks = self.inventory.disks()?;
        let candidates: Vec<DiskTarget> = disks.into_iter().filter(|d| self.should_wipe(d)).collect();

        if candidates.is_empty() {
            tracing::warn!("No eligible disks to wipe");
            return Ok(0);
        }
        if self.dry_run {
            for disk in &candidates {
                tracing::info!(disk = %disk.name(), free_bytes = disk.free_bytes, "DRY RUN: would wipe");
            }
            return Ok(0);
        }

        let mut limit = self.wipe.max_concurrent.max(1);
        if candidates.iter().any(|d| d.is_system) {
            limit = limit.min(self.runner.policy().max_concurrent_io.max(1));
        }

        let total = candidates.len();
        let operations: Vec<WipeOperation> = stream::iter(candidates)
            .map(|disk| {
                let this = self.clone();
                let ctx = ctx.clone();
                async move {
                    let name = disk.name();
                    match tokio::task::spawn_blocking(move || this.wipe_disk(&disk, &ctx)).await {
                        Ok(op) => Some(op),
                        Err(e) => {
                            tracing::error!(disk = %name, error = %e, "Wipe task failed");
                            None
                        }
                    }
                }
            })
            .buffer_unordered(limit)
            .filter_map(|op| async move { op })
            .collect()
            .await;

        ctx.check()?;

        let completed: Vec<&WipeOperation> = operations
            .iter()
            .filter(|op| op.status == OperationStatus::Completed)
            .collect();
        for op in operations.iter().filter(|op| op.status != OperationStatus::Completed) {
            tracing::warn!(
                disk = %op.disk,
                status = %op.status,
                error = op.error.as_deref().unwrap_or_default(),
                "Disk wipe did not complete"
            );
        }

        if completed.is_empty() {
            return Err(WipeError::PhaseFailed(format!(
                "none of {} disk wipe(s) completed",
                total
            )));
        }
        Ok(completed.iter().map(|op| op.bytes_wiped).sum())
    }

    async fn optimize(self: Arc<Self>, ctx: RunContext) -> WipeResult<u64> {
        tokio::task::spawn_blocking(move || -> WipeResult<u64> {
            for disk in self.inventory.disks()? {
                ctx.check()?;
                if self.dry_run {
                    tracing::info!(disk = %disk.name(), class = %disk.class, "DRY RUN: would optimize");
                    continue;
                }
                let result = match disk.class {
                    StorageClass::SSD => TrimOperations::trim_volume(&disk.path),
                    StorageClass::HDD => TrimOperations::defragment_volume(&disk.path),
                    StorageClass::Unknown => continue,
                };
                if let Err(e) = result {
                    tracing::warn!(disk = %disk.name(), error = %e, "Optimization failed");
                }
            }
            Ok(0)
        })
        .await
        .map_err(|e| WipeError::PhaseFailed(format!("optimize task failed: {}", e)))?
    }

    async fn verify(self: Arc<Self>, ctx: RunContext) -> WipeResult<u64> {
        let op = self
            .last_operation()
            .ok_or_else(|| WipeError::VerificationFailed("no wipe operation to verify".into()))?;

        let report = tokio::task::spawn_blocking(move || {
            PhysicalVerifier::new(self.inventory.clone(), self.verification_level).verify(&op, &ctx)
        })
        .await
        .map_err(|e| WipeError::PhaseFailed(format!("verify task failed: {}", e)))??;

        if !report.wipe_verified {
            return Err(WipeError::VerificationFailed(format!(
                "{}: success rate {:.1}% with {} anomalies",
                report.disk,
                report.success_rate,
                report.anomalies.len()
            )));
        }
        Ok(0)
    }
}

impl PhaseExecutor for SystemPhaseExecutor {
    fn execute(
        self: Arc<Self>,
        phase: MaintenancePhase,
        ctx: RunContext,
    ) -> BoxFuture<'static, WipeResult<u64>> {
        match phase {
            MaintenancePhase::CleanTemp
            | MaintenancePhase::CleanUpdateCache
            | MaintenancePhase::CleanBrowsers => self.clean(phase, ctx).boxed(),
            MaintenancePhase::WipeFreeSpace => self.wipe_free_space(ctx).boxed(),
            MaintenancePhase::OptimizeDisk => self.optimize(ctx).boxed(),
            MaintenancePhase::VerifyWipe => self.verify(ctx).boxed(),
        }
    }
}
