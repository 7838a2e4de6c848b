use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Depth of a verification run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationLevel {
    /// Space and throughput sanity checks
    #[default]
    Basic,
    /// Basic plus a canary write and read-back
    Physical,
    /// Physical plus residue scans
    Aggressive,
}

impl VerificationLevel {
    /// Read-back attempts for the canary
    pub fn max_attempts(&self) -> u32 {
        match self {
            VerificationLevel::Basic => 3,
            VerificationLevel::Physical => 5,
            VerificationLevel::Aggressive => 10,
        }
    }

    /// Canary size in bytes
    pub fn buffer_size(&self) -> usize {
        match self {
            VerificationLevel::Basic => 64 * 1024,
            VerificationLevel::Physical => 128 * 1024,
            VerificationLevel::Aggressive => 256 * 1024,
        }
    }

    /// Time budget of one run
    pub fn timeout(&self) -> Duration {
        match self {
            VerificationLevel::Basic => Duration::from_secs(30 * 60),
            VerificationLevel::Physical => Duration::from_secs(60 * 60),
            VerificationLevel::Aggressive => Duration::from_secs(2 * 60 * 60),
        }
    }

    pub fn writes_canary(&self) -> bool {
        !matches!(self, VerificationLevel::Basic)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationLevel::Basic => "basic",
            VerificationLevel::Physical => "physical",
            VerificationLevel::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for VerificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(VerificationLevel::Basic),
            "physical" => Ok(VerificationLevel::Physical),
            "aggressive" => Ok(VerificationLevel::Aggressive),
            other => Err(format!("unknown verification level: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Points deducted from the success rate
    pub fn penalty(&self) -> f64 {
        match self {
            Severity::Low => 5.0,
            Severity::Medium => 10.0,
            Severity::High => 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    SpaceMismatch,
    SpeedAnomaly,
    ReadError,
    SizeMismatch,
    DataCorruption,
    MetadataResidue,
    FreeSpaceResidue,
    VerificationError,
}

/// Something a verification run found suspicious
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub description: String,
    pub location: String,
    pub severity: Severity,
}

impl Anomaly {
    pub fn new(
        kind: AnomalyKind,
        severity: Severity,
        location: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            description: description.into(),
            location: location.into(),
            severity,
        }
    }
}

/// Sanitization standards a run can vouch for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplianceStandard {
    #[serde(rename = "DOD5220")]
    Dod5220,
    #[serde(rename = "NIST800-88")]
    Nist80088,
    #[serde(rename = "BSI_VSITR")]
    BsiVsitr,
}

impl ComplianceStandard {
    pub const ALL: [ComplianceStandard; 3] = [
        ComplianceStandard::Dod5220,
        ComplianceStandard::Nist80088,
        ComplianceStandard::BsiVsitr,
    ];

    /// Minimum success rate
    pub fn threshold(&self) -> f64 {
        match self {
            ComplianceStandard::Dod5220 => 95.0,
            ComplianceStandard::Nist80088 => 90.0,
            ComplianceStandard::BsiVsitr => 85.0,
        }
    }
}

impl fmt::Display for ComplianceStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceStandard::Dod5220 => write!(f, "DOD5220"),
            ComplianceStandard::Nist80088 => write!(f, "NIST800-88"),
            ComplianceStandard::BsiVsitr => write!(f, "BSI_VSITR"),
        }
    }
}

/// Success rate required for `wipe_verified`
pub const VERIFIED_THRESHOLD: f64 = 95.0;

/// 100, minus the severity penalty of every anomaly, minus one point per KiB
/// of recovered data, floored at 0.
pub fn success_rate(anomalies: &[Anomaly], recovered_bytes: u64) -> f64 {
    let penalties: f64 = anomalies.iter().map(|a| a.severity.penalty()).sum();
    let rate = 100.0 - penalties - recovered_bytes as f64 / 1024.0;
    rate.max(0.0)
}

/// Every standard whose threshold `rate` meets
pub fn compliance_for(rate: f64) -> Vec<ComplianceStandard> {
    ComplianceStandard::ALL
        .into_iter()
        .filter(|standard| rate >= standard.threshold())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub disk: String,
    pub method: String,
    pub passes: u32,
    pub verification_level: VerificationLevel,
    pub wipe_verified: bool,
    pub recovery_attempts: u32,
    pub recovered_data: u64,
    pub anomalies: Vec<Anomaly>,
    pub compliance: Vec<ComplianceStandard>,
    pub success_rate: f64,
    /// SHA-256 of the canary written, if any
    pub canary_sha256: Option<String>,
    pub test_duration: Duration,
    pub test_date: DateTime<Utc>,
}

impl VerificationReport {
    pub fn has_high_severity(&self) -> bool {
        self.anomalies.iter().any(|a| a.severity == Severity::High)
    }
}
