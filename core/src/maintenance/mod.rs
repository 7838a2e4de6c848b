// Scheduled maintenance: plans, the orchestrator that runs them, and the
// production executor for each phase.

pub mod cleanup;
pub mod executor;
pub mod orchestrator;
pub mod plan;


pub use cleanup::{clean_paths, CleanupSummary, CleanupTargets};
pub use executor::SystemPhaseExecutor;
pub use orchestrator::{
    MaintenanceOrchestrator, MaintenanceReport, PhaseExecutor, PhaseResult, PhaseStatus,
    ReportStatus,
};
pub use plan::{plan_by_name, plan_names, predefined_plans, MaintenancePhase, MaintenancePlan};
