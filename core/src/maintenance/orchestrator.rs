//! Runs maintenance plans phase by phase.
//!
//! Phases are isolated from each other: a failing, timed-out or panicking
//! phase is recorded in its [`PhaseResult`] and never aborts the plan itself.

use super::plan::{MaintenancePhase, MaintenancePlan};
use crate::control::{CancelToken, RunContext};
use crate::drives::is_elevated;
use crate::{WipeError, WipeResult};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Does the actual work of a phase, returning the bytes it cleaned.
///
/// Implementations must observe the context: long-running work should check
/// it regularly and stop once it reports an interruption.
pub trait PhaseExecutor: Send + Sync + 'static {
    fn execute(
        self: Arc<Self>,
        phase: MaintenancePhase,
        ctx: RunContext,
    ) -> BoxFuture<'static, WipeResult<u64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    Completed,
    Failed,
    TimedOut,
    Cancelled,
    Skipped,
}

impl PhaseStatus {
    /// Counted against the plan
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PhaseStatus::Failed | PhaseStatus::TimedOut | PhaseStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase: MaintenancePhase,
    pub status: PhaseStatus,
    pub duration: Duration,
    pub error: Option<String>,
    pub bytes_cleaned: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl PhaseResult {
    fn skipped(phase: MaintenancePhase, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            phase,
            status: PhaseStatus::Skipped,
            duration: Duration::ZERO,
            error: Some(reason.into()),
            bytes_cleaned: 0,
            start_time: now,
            end_time: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl ReportStatus {
    /// Status of a plan given its phase counts. User cancellation wins.
    pub fn derive(cancelled: bool, successes: usize, failures: usize) -> Self {
        if cancelled {
            ReportStatus::Cancelled
        } else if failures == 0 {
            ReportStatus::Completed
        } else if successes > 0 {
            ReportStatus::Partial
        } else {
            ReportStatus::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub plan_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_duration: Duration,
    pub status: ReportStatus,
    pub phase_results: Vec<PhaseResult>,
    /// Bytes cleaned by completed phases
    pub total_cleaned: u64,
    pub success_count: usize,
    pub failure_count: usize,
    pub skipped_count: usize,
}

impl MaintenanceReport {
    fn assemble(
        plan: &MaintenancePlan,
        start_time: DateTime<Utc>,
        started: Instant,
        phase_results: Vec<PhaseResult>,
        cancelled: bool,
    ) -> Self {
        let success_count = phase_results
            .iter()
            .filter(|r| r.status == PhaseStatus::Completed)
            .count();
        let failure_count = phase_results.iter().filter(|r| r.status.is_failure()).count();
        let skipped_count = phase_results
            .iter()
            .filter(|r| r.status == PhaseStatus::Skipped)
            .count();
        let total_cleaned = phase_results
            .iter()
            .filter(|r| r.status == PhaseStatus::Completed)
            .map(|r| r.bytes_cleaned)
            .sum();

        Self {
            plan_name: plan.name.clone(),
            start_time,
            end_time: Utc::now(),
            total_duration: started.elapsed(),
            status: ReportStatus::derive(cancelled, success_count, failure_count),
            phase_results,
            total_cleaned,
            success_count,
            failure_count,
            skipped_count,
        }
    }

    pub fn result_for(&self, phase: MaintenancePhase) -> Option<&PhaseResult> {
        self.phase_results.iter().find(|r| r.phase == phase)
    }
}

pub struct MaintenanceOrchestrator {
    executor: Arc<dyn PhaseExecutor>,
    check_privileges: bool,
}

impl MaintenanceOrchestrator {
    pub fn new(executor: Arc<dyn PhaseExecutor>) -> Self {
        Self {
            executor,
            check_privileges: true,
        }
    }

    /// Run admin-only plans without checking the process is elevated.
    pub fn without_privilege_check(mut self) -> Self {
        self.check_privileges = false;
        self
    }

    /// Execute `plan` to completion, honoring `token` and the plan deadline.
    pub async fn execute_plan(&self, plan: &MaintenancePlan, token: CancelToken) -> MaintenanceReport {
        let start_time = Utc::now();
        let started = Instant::now();

        tracing::info!(
            plan = %plan.name,
            phases = plan.phases.len(),
            timeout_secs = plan.timeout.as_secs(),
            parallel = plan.parallel,
            "Starting maintenance plan"
        );

        if plan.require_admin && self.check_privileges && !is_elevated() {
            tracing::warn!(plan = %plan.name, "Plan requires administrator privileges");
            let results = plan
                .phases
                .iter()
                .map(|phase| PhaseResult::skipped(*phase, "administrator privileges required"))
                .collect();
            let mut report = MaintenanceReport::assemble(plan, start_time, started, results, false);
            report.status = ReportStatus::Failed;
            return report;
        }

        let plan_ctx = RunContext::new(token.clone()).with_timeout(plan.timeout);
        let results = if plan.parallel {
            self.run_parallel(plan, &plan_ctx).await
        } else {
            self.run_sequential(plan, &plan_ctx).await
        };

        let report =
            MaintenanceReport::assemble(plan, start_time, started, results, token.is_cancelled());

        tracing::info!(
            plan = %plan.name,
            status = ?report.status,
            succeeded = report.success_count,
            failed = report.failure_count,
            skipped = report.skipped_count,
            cleaned_mb = report.total_cleaned / (1024 * 1024),
            "Maintenance plan finished"
        );
        report
    }

    async fn run_sequential(&self, plan: &MaintenancePlan, plan_ctx: &RunContext) -> Vec<PhaseResult> {
        let mut results = Vec::with_capacity(plan.phases.len());
        let mut stop_reason: Option<String> = None;

        for phase in &plan.phases {
            if let Some(reason) = &stop_reason {
                results.push(PhaseResult::skipped(*phase, reason.clone()));
                continue;
            }
            if let Err(why) = plan_ctx.check() {
                let reason = format!("plan stopped: {}", why);
                results.push(PhaseResult::skipped(*phase, reason.clone()));
                stop_reason = Some(reason);
                continue;
            }

            let result = run_phase(self.executor.clone(), *phase, plan_ctx.clone()).await;
            if result.status != PhaseStatus::Completed && !plan.silent {
                tracing::error!(
                    plan = %plan.name,
                    phase = %phase,
                    status = ?result.status,
                    "Phase did not complete, stopping plan"
                );
                stop_reason = Some(format!("skipped after {} did not complete", phase));
            }
            results.push(result);
        }
        results
    }

    async fn run_parallel(&self, plan: &MaintenancePlan, plan_ctx: &RunContext) -> Vec<PhaseResult> {
        let mut tasks: FuturesUnordered<_> = plan
            .phases
            .iter()
            .map(|phase| {
                let phase = *phase;
                let handle = tokio::spawn(run_phase(self.executor.clone(), phase, plan_ctx.clone()));
                async move { (phase, handle.await) }
            })
            .collect();

        let mut results = Vec::with_capacity(plan.phases.len());
        while let Some((phase, joined)) = tasks.next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(phase = %phase, error = %e, "Phase task aborted");
                    let now = Utc::now();
                    results.push(PhaseResult {
                        phase,
                        status: PhaseStatus::Failed,
                        duration: Duration::ZERO,
                        error: Some(format!("phase task aborted: {}", e)),
                        bytes_cleaned: 0,
                        start_time: now,
                        end_time: now,
                    });
                }
            }
        }
        results
    }
}

/// Resolves when `deadline` passes; never when there is none.
async fn deadline_reached(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending::<()>().await,
    }
}

async fn run_phase(
    executor: Arc<dyn PhaseExecutor>,
    phase: MaintenancePhase,
    plan_ctx: RunContext,
) -> PhaseResult {
    let start_time = Utc::now();
    let started = Instant::now();
    let ctx = plan_ctx.with_timeout(phase.timeout());
    let token = ctx.token().clone();
    let deadline = ctx.deadline();

    tracing::info!(phase = %phase, "Running phase");

    let work = executor.execute(phase, ctx);
    let outcome: WipeResult<u64> = tokio::select! {
        result = work => result,
        _ = token.cancelled() => Err(WipeError::Cancelled),
        _ = deadline_reached(deadline) => Err(WipeError::TimedOut(format!("phase {} exceeded its budget", phase))),
    };

    let (status, error, bytes_cleaned) = match outcome {
        Ok(bytes) => (PhaseStatus::Completed, None, bytes),
        Err(WipeError::Cancelled) => (PhaseStatus::Cancelled, Some(WipeError::Cancelled.to_string()), 0),
        Err(e @ WipeError::TimedOut(_)) => (PhaseStatus::TimedOut, Some(e.to_string()), 0),
        Err(e) => (PhaseStatus::Failed, Some(e.to_string()), 0),
    };

    let duration = started.elapsed();
    match status {
        PhaseStatus::Completed => tracing::info!(
            phase = %phase,
            duration_ms = duration.as_millis() as u64,
            cleaned_mb = bytes_cleaned / (1024 * 1024),
            "Phase completed"
        ),
        _ => tracing::warn!(
            phase = %phase,
            status = ?status,
            error = error.as_deref().unwrap_or_default(),
            "Phase did not complete"
        ),
    }

    PhaseResult {
        phase,
        status,
        duration,
        error,
        bytes_cleaned,
        start_time,
        end_time: Utc::now(),
    }
}
