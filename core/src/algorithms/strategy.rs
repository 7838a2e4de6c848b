// Overwrite strategies: pure sizing and cadence policies for filler artifacts

use super::pattern::FillPattern;
use crate::config::{WipeEngine, WipeProfile};
use crate::{StorageClass, GIB, MIB};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pattern sequence the cipher strategy always writes
pub const CIPHER_PATTERNS: [FillPattern; 3] =
    [FillPattern::Zero, FillPattern::Ones, FillPattern::Random];

/// How artifacts are sized and how often they are flushed.
///
/// A closed set of policies; every lookup is a pure function of the variant,
/// the profile and the storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwriteStrategy {
    /// Moderate artifacts, frequent syncs
    Standard,
    /// Large artifacts in the manner of SDelete, one pass
    SDelete,
    /// Very large artifacts, three fixed passes in the manner of `cipher /w`
    Cipher,
}

impl OverwriteStrategy {
    pub fn for_engine(engine: WipeEngine) -> Self {
        match engine {
            WipeEngine::Internal => OverwriteStrategy::Standard,
            WipeEngine::SdeleteCompatible => OverwriteStrategy::SDelete,
            WipeEngine::Cipher => OverwriteStrategy::Cipher,
        }
    }

    /// Target artifact size in bytes
    pub fn file_size(&self, profile: WipeProfile, class: StorageClass) -> u64 {
        let ssd = class.is_solid_state();
        let gib = match self {
            OverwriteStrategy::Standard => match profile {
                WipeProfile::Safe => (1, 2),
                WipeProfile::Balanced | WipeProfile::Sdelete => (2, 4),
                WipeProfile::Aggressive => (4, 8),
                WipeProfile::Fast => (8, 16),
            },
            OverwriteStrategy::SDelete => match profile {
                WipeProfile::Safe => (4, 4),
                WipeProfile::Balanced => (8, 8),
                WipeProfile::Aggressive | WipeProfile::Fast | WipeProfile::Sdelete => (16, 16),
            },
            OverwriteStrategy::Cipher => (16, 32),
        };
        let (hdd, ssd_size) = gib;
        if ssd {
            ssd_size * GIB
        } else {
            hdd * GIB
        }
    }

    /// Bytes written to an artifact between durable syncs
    pub fn sync_interval(&self) -> u64 {
        match self {
            OverwriteStrategy::Standard => 512 * MIB,
            OverwriteStrategy::SDelete => GIB,
            OverwriteStrategy::Cipher => 2 * GIB,
        }
    }

    /// Free space below which a pass stops creating artifacts
    pub fn min_free_space(&self) -> u64 {
        match self {
            OverwriteStrategy::Standard => 100 * MIB,
            OverwriteStrategy::SDelete => 50 * MIB,
            OverwriteStrategy::Cipher => 10 * MIB,
        }
    }

    /// Upper bound on artifacts created by one pass
    pub fn max_files(&self) -> usize {
        match self {
            OverwriteStrategy::Standard => 1000,
            OverwriteStrategy::SDelete => 100,
            OverwriteStrategy::Cipher => 50,
        }
    }

    /// Pass count actually run for a configured count
    pub fn pass_count(&self, configured: u32) -> u32 {
        match self {
            OverwriteStrategy::Standard => configured,
            OverwriteStrategy::SDelete => 1,
            OverwriteStrategy::Cipher => CIPHER_PATTERNS.len() as u32,
        }
    }

    /// Patterns mandated by the strategy regardless of the configured method
    pub fn mandated_patterns(&self) -> Option<&'static [FillPattern]> {
        match self {
            OverwriteStrategy::Cipher => Some(&CIPHER_PATTERNS),
            _ => None,
        }
    }
}

impl fmt::Display for OverwriteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverwriteStrategy::Standard => write!(f, "standard"),
            OverwriteStrategy::SDelete => write!(f, "sdelete"),
            OverwriteStrategy::Cipher => write!(f, "cipher"),
        }
    }
}
