//! Wipe configuration, performance profiles and layered settings loading.
//!
//! Settings are assembled with the `config` crate from built-in defaults, an
//! optional file and `FREEWIPE__SECTION__KEY` environment variables, then
//! validated before anything touches a disk.

use crate::verification::VerificationLevel;
use crate::{StorageClass, WipeError, WipeResult, MIB};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const MAX_PASSES: u32 = 10;
pub const MAX_CHUNK_SIZE: u64 = 100 * MIB;
pub const MAX_SPEED_MBPS: f64 = 1000.0;
pub const MAX_FILE_DELAY_MS: u64 = 60_000;
pub const MAX_CONCURRENT: usize = 10;

/// Overwrite method: which pattern each pass writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WipeMethod {
    Random,
    Zero,
    #[serde(rename = "dod5220")]
    DoD5220,
    #[serde(alias = "sdelete-compatible")]
    SdeleteCompatible,
}

/// Engine choice, mapped onto an overwrite strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WipeEngine {
    Internal,
    #[serde(alias = "sdelete-compatible", alias = "sdelete")]
    SdeleteCompatible,
    Cipher,
}

/// Performance profile: sizing and pacing preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WipeProfile {
    Safe,
    Balanced,
    Aggressive,
    Fast,
    Sdelete,
}

macro_rules! string_enum {
    ($ty:ident { $($variant:ident => $name:literal $(| $alias:literal)*),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($name $(| $alias)* => Ok($ty::$variant),)+
                    other => Err(format!("unknown {}: {}", stringify!($ty), other)),
                }
            }
        }
    };
}

string_enum!(WipeMethod {
    Random => "random",
    Zero => "zero",
    DoD5220 => "dod5220" | "dod",
    SdeleteCompatible => "sdelete_compatible" | "sdelete-compatible",
});

string_enum!(WipeEngine {
    Internal => "internal",
    SdeleteCompatible => "sdelete_compatible" | "sdelete-compatible" | "sdelete",
    Cipher => "cipher",
});

string_enum!(WipeProfile {
    Safe => "safe",
    Balanced => "balanced",
    Aggressive => "aggressive",
    Fast => "fast",
    Sdelete => "sdelete",
});

/// Everything a wipe operation needs to know about how to write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WipeConfiguration {
    pub method: WipeMethod,
    pub hdd_passes: u32,
    pub ssd_passes: u32,
    /// Upper bound of a single I/O chunk in bytes
    pub chunk_size: u64,
    /// 0 disables throttling
    pub max_speed_mbps: f64,
    pub file_delay_ms: u64,
    /// Operation-wide limit such as "2h" or "90m"; empty means none
    pub max_duration: String,
    pub engine: WipeEngine,
    pub profile: WipeProfile,
    pub enable_trim: bool,
    pub max_concurrent: usize,
}

impl Default for WipeConfiguration {
    fn default() -> Self {
        Self {
            method: WipeMethod::Random,
            hdd_passes: 1,
            ssd_passes: 1,
            chunk_size: 4 * MIB,
            max_speed_mbps: 100.0,
            file_delay_ms: 100,
            max_duration: "2h".to_string(),
            engine: WipeEngine::Internal,
            profile: WipeProfile::Balanced,
            enable_trim: true,
            max_concurrent: 2,
        }
    }
}

impl WipeConfiguration {
    /// Defaults with `profile`'s presets applied
    pub fn from_profile(profile: WipeProfile) -> Self {
        let mut config = Self::default();
        config.apply_profile(profile);
        config
    }

    /// Overwrite pacing, sizing and pass counts with the profile's presets.
    pub fn apply_profile(&mut self, profile: WipeProfile) {
        self.profile = profile;
        match profile {
            WipeProfile::Safe => {
                self.max_speed_mbps = 10.0;
                self.chunk_size = 8 * MIB;
                self.file_delay_ms = 500;
                self.hdd_passes = 1;
                self.ssd_passes = 1;
            }
            WipeProfile::Balanced => {
                self.max_speed_mbps = 25.0;
                self.chunk_size = 32 * MIB;
                self.file_delay_ms = 200;
                self.hdd_passes = 3;
                self.ssd_passes = 1;
            }
            WipeProfile::Aggressive => {
                self.max_speed_mbps = 0.0;
                self.chunk_size = MAX_CHUNK_SIZE;
                self.file_delay_ms = 0;
                self.hdd_passes = 5;
                self.ssd_passes = 2;
            }
            WipeProfile::Fast => {
                self.max_speed_mbps = 0.0;
                self.chunk_size = MAX_CHUNK_SIZE;
                self.file_delay_ms = 0;
                self.hdd_passes = 1;
                self.ssd_passes = 1;
            }
            WipeProfile::Sdelete => {
                self.max_speed_mbps = 50.0;
                self.chunk_size = 64 * MIB;
                self.file_delay_ms = 100;
                self.hdd_passes = 1;
                self.ssd_passes = 1;
                self.method = WipeMethod::SdeleteCompatible;
                self.enable_trim = true;
            }
        }
    }

    /// Target pass count for a disk of `class`; unknown media count as HDD.
    pub fn passes_for(&self, class: StorageClass) -> u32 {
        match class {
            StorageClass::SSD => self.ssd_passes,
            StorageClass::HDD | StorageClass::Unknown => self.hdd_passes,
        }
    }

    pub fn file_delay(&self) -> Duration {
        Duration::from_millis(self.file_delay_ms)
    }

    /// Parsed `max_duration`, `None` when unset.
    pub fn max_duration(&self) -> WipeResult<Option<Duration>> {
        let raw = self.max_duration.trim();
        if raw.is_empty() || raw == "0" {
            return Ok(None);
        }
        humantime::parse_duration(raw)
            .map(Some)
            .map_err(|e| WipeError::InvalidConfig(format!("invalid max_duration '{}': {}", raw, e)))
    }

    pub fn validate(&self) -> WipeResult<()> {
        for (label, passes) in [("HDD", self.hdd_passes), ("SSD", self.ssd_passes)] {
            if passes == 0 || passes > MAX_PASSES {
                return Err(WipeError::InvalidConfig(format!(
                    "{} passes must be between 1 and {}, got {}",
                    label, MAX_PASSES, passes
                )));
            }
        }

        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(WipeError::InvalidConfig(format!(
                "chunk size must be between 1 byte and {} bytes, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }

        if !(0.0..=MAX_SPEED_MBPS).contains(&self.max_speed_mbps) {
            return Err(WipeError::InvalidConfig(format!(
                "max speed must be between 0 and {} MB/s, got {}",
                MAX_SPEED_MBPS, self.max_speed_mbps
            )));
        }

        if self.file_delay_ms > MAX_FILE_DELAY_MS {
            return Err(WipeError::InvalidConfig(format!(
                "file delay must be between 0 and {} ms, got {}",
                MAX_FILE_DELAY_MS, self.file_delay_ms
            )));
        }

        if self.max_concurrent == 0 || self.max_concurrent > MAX_CONCURRENT {
            return Err(WipeError::InvalidConfig(format!(
                "max concurrent must be between 1 and {}, got {}",
                MAX_CONCURRENT, self.max_concurrent
            )));
        }

        self.max_duration()?;
        Ok(())
    }
}

/// Gates that protect disks the host depends on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    pub allow_system_disk: bool,
    pub force_wipe_ssd: bool,
    /// Volume roots never touched by maintenance wipes
    pub excluded_disks: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    pub json: bool,
    /// Daily-rolling log file directory
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub level: VerificationLevel,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            level: VerificationLevel::Basic,
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub wipe: WipeConfiguration,
    pub security: SecuritySettings,
    pub logging: LoggingSettings,
    pub verification: VerificationSettings,
}

pub const ENV_PREFIX: &str = "FREEWIPE";

/// Per-user settings file stem (extension picked by the `config` crate)
pub fn default_settings_stem() -> Option<PathBuf> {
    ProjectDirs::from("", "", "freewipe").map(|dirs| dirs.config_dir().join("freewipe"))
}

impl AppSettings {
    /// Load defaults, then `path` (or the per-user file if present), then the environment.
    pub fn load(path: Option<&Path>) -> WipeResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AppSettings::default())?);

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
            }
            None => {
                if let Some(stem) = default_settings_stem() {
                    builder = builder.add_source(
                        config::File::with_name(&stem.to_string_lossy()).required(false),
                    );
                }
            }
        }

        let settings: AppSettings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.wipe.validate()?;
        tracing::debug!(
            engine = %settings.wipe.engine,
            profile = %settings.wipe.profile,
            method = %settings.wipe.method,
            "Settings loaded"
        );
        Ok(settings)
    }
}
