//! Shared fixtures for the integration tests.

#![allow(dead_code)]

pub mod mock_volume;

use freewipe::config::{WipeConfiguration, WipeEngine, WipeMethod, WipeProfile};
use freewipe::{DiskTarget, StorageClass};
use std::path::Path;

/// Profile presets with pacing switched off so tests run at memory speed
pub fn unthrottled(profile: WipeProfile) -> WipeConfiguration {
    let mut config = WipeConfiguration::from_profile(profile);
    config.max_speed_mbps = 0.0;
    config.file_delay_ms = 0;
    config
}

/// Cipher engine, three quick passes, no TRIM
pub fn cipher_config() -> WipeConfiguration {
    let mut config = unthrottled(WipeProfile::Fast);
    config.engine = WipeEngine::Cipher;
    config.method = WipeMethod::Random;
    config.enable_trim = false;
    config
}

/// SDelete-compatible engine: one pass, no TRIM
pub fn sdelete_config() -> WipeConfiguration {
    let mut config = unthrottled(WipeProfile::Fast);
    config.engine = WipeEngine::SdeleteCompatible;
    config.enable_trim = false;
    config
}

/// A disk rooted at a real directory, e.g. a tempdir
pub fn dir_disk(dir: &Path, class: StorageClass, free: u64) -> DiskTarget {
    DiskTarget::new(dir, class, free * 4, free)
}
