/// Integration tests for single overwrite passes against a simulated volume
mod common;

use common::mock_volume::MockVolume;
use freewipe::algorithms::{FillPattern, OverwriteStrategy};
use freewipe::config::WipeProfile;
use freewipe::io::BufferPool;
use freewipe::wipe::{SessionParams, SessionState, WipeSession};
use freewipe::{CancelToken, DiskTarget, RunContext, StorageClass, GIB, MIB};
use std::sync::Arc;
use std::time::Duration;

fn params(pattern: FillPattern, free: u64) -> SessionParams {
    SessionParams {
        pass: 0,
        total_passes: 1,
        pattern,
        strategy: OverwriteStrategy::Standard,
        profile: WipeProfile::Balanced,
        throttle_mbps: 0.0,
        file_delay: Duration::ZERO,
        chunk_ceiling: 32 * MIB,
        free_space_estimate: free,
    }
}

fn run(volume: &MockVolume, class: StorageClass, params: SessionParams, ctx: &RunContext) -> freewipe::wipe::SessionReport {
    let disk = DiskTarget::new("/mock/volume", class, 100 * GIB, params.free_space_estimate);
    WipeSession::new(&disk, volume, Arc::new(BufferPool::new()), params).run(ctx)
}

#[test]
fn test_random_pass_fills_to_capacity() {
    let volume = MockVolume::new(64 * MIB);

    let report = run(&volume, StorageClass::SSD, params(FillPattern::Random, GIB), &RunContext::unbounded());

    assert_eq!(report.state, SessionState::FullStop);
    assert_eq!(report.bytes_written, 64 * MIB);
    assert_eq!(volume.total_written(), 64 * MIB);
    assert_eq!(volume.created(), 1);
    assert_eq!(volume.removed(), 1);
    assert_eq!(volume.used(), 0);
}

#[test]
fn test_pass_spans_several_artifacts() {
    let volume = MockVolume::new(8 * GIB);

    let report = run(&volume, StorageClass::HDD, params(FillPattern::Zero, 3 * GIB), &RunContext::unbounded());

    // free/20 is under the 1 GiB floor, so every artifact is 1 GiB
    assert_eq!(report.state, SessionState::FullStop);
    assert_eq!(report.artifacts_created, 3);
    assert_eq!(report.bytes_written, 3 * GIB);
    assert_eq!(volume.live_files(), 0);
}

#[cfg(unix)]
#[test]
fn test_enospc_ends_pass_normally() {
    let volume = MockVolume::new(10 * GIB).fail_after(300 * MIB, libc::ENOSPC);

    let report = run(&volume, StorageClass::HDD, params(FillPattern::Zero, 5 * GIB), &RunContext::unbounded());

    assert_eq!(report.state, SessionState::FullStop);
    assert_eq!(report.bytes_written, 300 * MIB);
    assert!(report.error.is_none());
    assert_eq!(volume.live_files(), 0);
}

#[cfg(unix)]
#[test]
fn test_os_failures_are_terminal() {
    let cases = vec![
        (libc::ENODEV, SessionState::DeviceUnavailable),
        (libc::ENXIO, SessionState::DeviceUnavailable),
        (libc::EIO, SessionState::WriteFailed),
    ];

    for (code, expected) in cases {
        let volume = MockVolume::new(10 * GIB).fail_after(100 * MIB, code);
        let report = run(&volume, StorageClass::HDD, params(FillPattern::Zero, 5 * GIB), &RunContext::unbounded());

        assert_eq!(report.state, expected, "os error {}", code);
        assert!(report.error.is_some());
        assert_eq!(report.bytes_written, 100 * MIB);
        assert_eq!(volume.live_files(), 0, "artifact left behind for os error {}", code);
    }
}

#[test]
fn test_cancel_mid_artifact_cleans_up() {
    let token = CancelToken::new();
    let volume = MockVolume::new(10 * GIB).cancel_after(200 * MIB, token.clone());

    let report = run(
        &volume,
        StorageClass::HDD,
        params(FillPattern::Zero, 5 * GIB),
        &RunContext::new(token),
    );

    assert_eq!(report.state, SessionState::Cancelled);
    assert!(report.bytes_written >= 200 * MIB);
    assert!(report.bytes_written < GIB);
    assert_eq!(volume.live_files(), 0);
}

#[test]
fn test_session_returns_buffers_to_pool() {
    let volume = MockVolume::new(16 * MIB);
    let pool = Arc::new(BufferPool::new());
    let disk = DiskTarget::new("/mock/volume", StorageClass::HDD, GIB, GIB);

    for _ in 0..3 {
        let report = WipeSession::new(&disk, &volume, pool.clone(), params(FillPattern::Zero, GIB))
            .run(&RunContext::unbounded());
        assert_eq!(report.state, SessionState::FullStop);
    }

    let stats = pool.stats();
    assert_eq!(stats.retained_buffers, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
}
