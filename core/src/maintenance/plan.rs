use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// A unit of maintenance work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenancePhase {
    CleanTemp,
    CleanUpdateCache,
    CleanBrowsers,
    WipeFreeSpace,
    OptimizeDisk,
    VerifyWipe,
}

impl MaintenancePhase {
    /// Budget of the phase, before clamping to the plan deadline
    pub fn timeout(&self) -> Duration {
        match self {
            MaintenancePhase::WipeFreeSpace => Duration::from_secs(2 * HOUR),
            MaintenancePhase::OptimizeDisk | MaintenancePhase::VerifyWipe => {
                Duration::from_secs(HOUR)
            }
            _ => Duration::from_secs(30 * MINUTE),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaintenancePhase::CleanTemp => "clean_temp",
            MaintenancePhase::CleanUpdateCache => "clean_update_cache",
            MaintenancePhase::CleanBrowsers => "clean_browsers",
            MaintenancePhase::WipeFreeSpace => "wipe_free_space",
            MaintenancePhase::OptimizeDisk => "optimize_disk",
            MaintenancePhase::VerifyWipe => "verify_wipe",
        }
    }
}

impl fmt::Display for MaintenancePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named, ordered list of phases with a deadline and execution mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenancePlan {
    pub name: String,
    pub description: String,
    pub phases: Vec<MaintenancePhase>,
    pub timeout: Duration,
    /// Run every phase as its own task
    pub parallel: bool,
    pub require_admin: bool,
    /// Keep going after a failed phase in sequential mode
    pub silent: bool,
}

impl MaintenancePlan {
    fn preset(
        name: &str,
        description: &str,
        phases: &[MaintenancePhase],
        timeout_secs: u64,
        parallel: bool,
        require_admin: bool,
        silent: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            phases: phases.to_vec(),
            timeout: Duration::from_secs(timeout_secs),
            parallel,
            require_admin,
            silent,
        }
    }
}

/// The built-in plans
pub fn predefined_plans() -> Vec<MaintenancePlan> {
    use MaintenancePhase::*;

    vec![
        MaintenancePlan::preset(
            "full_year",
            "Full yearly maintenance (requires admin)",
            &[CleanTemp, CleanUpdateCache, CleanBrowsers, WipeFreeSpace, OptimizeDisk, VerifyWipe],
            6 * HOUR,
            false,
            true,
            false,
        ),
        MaintenancePlan::preset(
            "light_monthly",
            "Light monthly cleanup",
            &[CleanTemp, CleanBrowsers],
            30 * MINUTE,
            true,
            false,
            false,
        ),
        MaintenancePlan::preset(
            "security_quarterly",
            "Quarterly security maintenance",
            &[CleanTemp, CleanUpdateCache, WipeFreeSpace, VerifyWipe],
            3 * HOUR,
            false,
            true,
            false,
        ),
        MaintenancePlan::preset(
            "quick_cleanup",
            "Quick temporary file cleanup",
            &[CleanTemp],
            15 * MINUTE,
            true,
            false,
            true,
        ),
        MaintenancePlan::preset(
            "deep_clean",
            "Deep cleanup and optimization",
            &[CleanTemp, CleanUpdateCache, CleanBrowsers, WipeFreeSpace, OptimizeDisk],
            4 * HOUR,
            false,
            true,
            false,
        ),
        MaintenancePlan::preset(
            "verify_only",
            "Verify the most recent wipe",
            &[VerifyWipe],
            HOUR,
            true,
            false,
            true,
        ),
    ]
}

pub fn plan_by_name(name: &str) -> Option<MaintenancePlan> {
    predefined_plans().into_iter().find(|plan| plan.name == name)
}

pub fn plan_names() -> Vec<String> {
    predefined_plans().into_iter().map(|plan| plan.name).collect()
}
