use super::report::*;
use super::verifier::*;
use crate::algorithms::OverwriteStrategy;
use crate::config::{WipeEngine, WipeMethod, WipeProfile};
use crate::control::{CancelToken, RunContext};
use crate::drives::inventory::MockDiskInventory;
use crate::drives::StaticInventory;
use crate::wipe::{OperationStatus, WipeOperation};
use crate::{DiskTarget, StorageClass, WipeError, WipeResult, GIB};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn operation(disk: &Path, bytes_wiped: u64, passes: u32, speed_mbps: f64) -> WipeOperation {
    WipeOperation {
        id: uuid::Uuid::new_v4(),
        disk: disk.display().to_string(),
        disk_class: StorageClass::HDD,
        system_disk: false,
        engine: WipeEngine::Internal,
        strategy: OverwriteStrategy::Standard,
        method: WipeMethod::Random,
        profile: WipeProfile::Balanced,
        passes,
        target_passes: passes,
        chunk_size: GIB,
        status: OperationStatus::Completed,
        start_time: Utc::now(),
        end_time: Some(Utc::now()),
        bytes_wiped,
        speed_mbps,
        error: None,
        warning: None,
        trimmed: false,
    }
}

fn verifier_for(disk: DiskTarget, level: VerificationLevel) -> PhysicalVerifier {
    PhysicalVerifier::new(Arc::new(StaticInventory::single(disk)), level)
        .with_backoff_unit(Duration::from_millis(1))
}

#[test]
fn test_basic_checks() {
    let disk = DiskTarget::new("/mnt/data", StorageClass::HDD, 100 * GIB, 10 * GIB);

    let op = operation(Path::new("/mnt/data"), 10 * GIB, 1, 120.0);
    assert!(basic_checks(&op, &disk).is_empty());

    // Claimed bytes are compared whole, however many passes produced them
    let op = operation(Path::new("/mnt/data"), 30 * GIB, 3, 120.0);
    let anomalies = basic_checks(&op, &disk);
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].kind, AnomalyKind::SpaceMismatch);
    assert_eq!(anomalies[0].severity, Severity::Medium);
    assert!(anomalies[0].description.contains("30720 MiB"));

    let op = operation(Path::new("/mnt/data"), 40 * GIB, 2, 1500.0);
    let kinds: Vec<AnomalyKind> = basic_checks(&op, &disk).iter().map(|a| a.kind).collect();
    assert_eq!(kinds, vec![AnomalyKind::SpaceMismatch, AnomalyKind::SpeedAnomaly]);
}

#[test]
fn test_compare_canary() {
    let expected = vec![7u8; 1024];

    let clean = compare_canary(&expected, &expected, 1, "canary");
    assert!(clean.anomaly.is_none());
    assert_eq!(clean.recovered, 0);

    let mut corrupted = expected.clone();
    corrupted[10] = 0;
    corrupted[20] = 0;
    let check = compare_canary(&expected, &corrupted, 2, "canary");
    let anomaly = check.anomaly.unwrap();
    assert_eq!(anomaly.kind, AnomalyKind::DataCorruption);
    assert_eq!(anomaly.severity, Severity::High);
    assert!(anomaly.description.contains("offset 10"));
    assert_eq!(check.recovered, 2);

    let check = compare_canary(&expected, &expected[..512], 3, "canary");
    assert_eq!(check.anomaly.unwrap().kind, AnomalyKind::SizeMismatch);
    assert_eq!(check.recovered, 512);
}

#[test]
fn test_unresolvable_disk_is_an_error() {
    let mut inventory = MockDiskInventory::new();
    inventory.expect_disks().returning(|| Ok(Vec::new()));
    let verifier = PhysicalVerifier::new(Arc::new(inventory), VerificationLevel::Basic);

    let op = operation(Path::new("/mnt/gone"), GIB, 1, 100.0);
    let result = verifier.verify(&op, &RunContext::unbounded());
    assert!(matches!(result, Err(WipeError::DiskNotFound(_))));
}

#[test]
fn test_basic_level_clean_report() {
    let dir = tempfile::tempdir().unwrap();
    let disk = DiskTarget::new(dir.path(), StorageClass::HDD, 100 * GIB, 50 * GIB);
    let op = operation(dir.path(), 10 * GIB, 1, 80.0);

    let report = verifier_for(disk, VerificationLevel::Basic)
        .verify(&op, &RunContext::unbounded())
        .unwrap();

    assert_eq!(report.success_rate, 100.0);
    assert!(report.wipe_verified);
    assert_eq!(report.recovery_attempts, 0);
    assert!(report.canary_sha256.is_none());
    assert_eq!(report.compliance, ComplianceStandard::ALL.to_vec());
}

#[test]
fn test_physical_level_canary_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let disk = DiskTarget::new(dir.path(), StorageClass::SSD, 100 * GIB, 50 * GIB);
    let op = operation(dir.path(), 10 * GIB, 1, 80.0);

    let report = verifier_for(disk, VerificationLevel::Physical)
        .verify(&op, &RunContext::unbounded())
        .unwrap();

    assert!(report.anomalies.is_empty(), "{:?}", report.anomalies);
    assert_eq!(report.recovery_attempts, 1);
    assert_eq!(report.recovered_data, 0);
    assert_eq!(report.canary_sha256.as_ref().map(|h| h.len()), Some(64));
    assert!(report.wipe_verified);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_internal_failure_becomes_anomaly() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("not_mounted");
    let disk = DiskTarget::new(&missing, StorageClass::HDD, 100 * GIB, 50 * GIB);
    let op = operation(&missing, GIB, 1, 80.0);

    let report = verifier_for(disk, VerificationLevel::Physical)
        .verify(&op, &RunContext::unbounded())
        .unwrap();

    assert_eq!(report.anomalies.len(), 1);
    assert_eq!(report.anomalies[0].kind, AnomalyKind::VerificationError);
    assert_eq!(report.anomalies[0].location, "verification_engine");
    assert_eq!(report.success_rate, 80.0);
    assert!(!report.wipe_verified);
    assert!(!report.compliance.contains(&ComplianceStandard::Dod5220));
}

#[test]
fn test_cancelled_run_still_reports() {
    let dir = tempfile::tempdir().unwrap();
    let disk = DiskTarget::new(dir.path(), StorageClass::HDD, 100 * GIB, 50 * GIB);
    let op = operation(dir.path(), GIB, 1, 80.0);
    let token = CancelToken::new();
    token.cancel();

    let report = verifier_for(disk, VerificationLevel::Physical)
        .verify(&op, &RunContext::new(token))
        .unwrap();

    assert_eq!(report.recovery_attempts, 0);
    assert!(report
        .anomalies
        .iter()
        .any(|a| a.kind == AnomalyKind::VerificationError));
}

struct ScriptedScanner;

impl ResidueScanner for ScriptedScanner {
    fn scan_metadata(&self, root: &Path, _ctx: &RunContext) -> WipeResult<Vec<Anomaly>> {
        Ok(vec![Anomaly::new(
            AnomalyKind::MetadataResidue,
            Severity::Medium,
            root.display().to_string(),
            "journal still references deleted files",
        )])
    }

    fn scan_free_space(&self, _root: &Path, _ctx: &RunContext) -> WipeResult<Vec<Anomaly>> {
        Err(WipeError::VerificationFailed("raw access unavailable".into()))
    }
}

#[test]
fn test_aggressive_level_runs_residue_scans() {
    let dir = tempfile::tempdir().unwrap();
    let disk = DiskTarget::new(dir.path(), StorageClass::HDD, 100 * GIB, 50 * GIB);
    let op = operation(dir.path(), GIB, 1, 80.0);

    let report = verifier_for(disk, VerificationLevel::Aggressive)
        .with_residue_scanner(Arc::new(ScriptedScanner))
        .verify(&op, &RunContext::unbounded())
        .unwrap();

    // Scanner errors are logged, not scored
    assert_eq!(report.anomalies.len(), 1);
    assert_eq!(report.anomalies[0].kind, AnomalyKind::MetadataResidue);
    assert_eq!(report.success_rate, 90.0);
    assert_eq!(
        report.compliance,
        vec![ComplianceStandard::Nist80088, ComplianceStandard::BsiVsitr]
    );
}
