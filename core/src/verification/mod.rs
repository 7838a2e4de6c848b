pub mod report;
pub mod verifier;

#[cfg(test)]
mod verifier_tests;

pub use report::{
    compliance_for, success_rate, Anomaly, AnomalyKind, ComplianceStandard, Severity,
    VerificationLevel, VerificationReport,
};
pub use verifier::{basic_checks, compare_canary, NoResidue, PhysicalVerifier, ResidueScanner};
