// Allow uppercase acronyms for industry-standard terms like HDD, SSD, TRIM
#![allow(clippy::upper_case_acronyms)]

pub mod algorithms;
pub mod config;
pub mod control;
pub mod crypto;
pub mod drives;
pub mod error;
pub mod io;
pub mod logging;
pub mod maintenance;
pub mod verification;
pub mod wipe;

pub use config::{WipeConfiguration, WipeEngine, WipeMethod, WipeProfile};
pub use control::{CancelToken, Interruption, RunContext};
pub use error::{WipeError, WipeResult};
pub use maintenance::{MaintenanceOrchestrator, MaintenancePlan, MaintenanceReport};
pub use verification::{PhysicalVerifier, VerificationLevel, VerificationReport};
pub use wipe::{OperationStatus, WipeOperation, WipeRunner};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
pub const GIB: u64 = 1024 * MIB;

/// Storage medium behind a volume. Drives chunk sizing, file sizing and TRIM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    SSD,
    HDD,
    Unknown,
}

impl StorageClass {
    pub fn is_solid_state(&self) -> bool {
        matches!(self, StorageClass::SSD)
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageClass::SSD => write!(f, "SSD"),
            StorageClass::HDD => write!(f, "HDD"),
            StorageClass::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A mounted volume selected for free-space wiping.
///
/// Supplied by a [`drives::DiskInventory`] and treated as immutable for the
/// duration of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskTarget {
    /// Volume root (mount point or drive letter).
    pub path: PathBuf,
    pub class: StorageClass,
    pub total_bytes: u64,
    pub free_bytes: u64,
    pub is_system: bool,
    pub is_writable: bool,
}

impl DiskTarget {
    pub fn new(path: impl Into<PathBuf>, class: StorageClass, total_bytes: u64, free_bytes: u64) -> Self {
        Self {
            path: path.into(),
            class,
            total_bytes,
            free_bytes,
            is_system: false,
            is_writable: true,
        }
    }

    pub fn with_system(mut self, is_system: bool) -> Self {
        self.is_system = is_system;
        self
    }

    pub fn with_writable(mut self, is_writable: bool) -> Self {
        self.is_writable = is_writable;
        self
    }

    /// Display name used in logs and reports.
    pub fn name(&self) -> String {
        self.path.display().to_string()
    }
}
