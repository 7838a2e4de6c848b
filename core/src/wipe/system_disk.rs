// Guard rails for wiping free space on the disk the OS runs from

use crate::drives::{resolve_disk, DiskInventory};
use crate::{DiskTarget, WipeError, WipeResult, GIB, MIB};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Limits applied when the target is the system disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemDiskPolicy {
    /// Directories allowed to hold filler artifacts
    pub allowed_paths: Vec<PathBuf>,
    /// Cap on the free-space estimate a pass may fill
    pub max_temp_bytes: u64,
    /// Ceiling on the I/O chunk size
    pub max_buffer_bytes: u64,
    pub max_concurrent_io: usize,
    pub timeout: Duration,
    /// Solid-state system disks are refused unless this is set
    pub force_wipe_ssd: bool,
}

impl Default for SystemDiskPolicy {
    fn default() -> Self {
        Self {
            allowed_paths: Self::default_allowed_paths(),
            max_temp_bytes: 2 * GIB,
            max_buffer_bytes: 256 * MIB,
            max_concurrent_io: 2,
            timeout: Duration::from_secs(30 * 60),
            force_wipe_ssd: false,
        }
    }
}

/// Caller's opt-ins for the system-disk gate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemDiskOptIn {
    pub allow_system_disk: bool,
    pub force_wipe_ssd: bool,
}

impl SystemDiskPolicy {
    fn default_allowed_paths() -> Vec<PathBuf> {
        let mut paths = vec![std::env::temp_dir()];
        if cfg!(windows) {
            if let Ok(windir) = std::env::var("WINDIR") {
                paths.push(PathBuf::from(windir).join("Temp"));
            }
            if let Ok(profile) = std::env::var("USERPROFILE") {
                paths.push(PathBuf::from(profile).join("AppData").join("Local").join("Temp"));
            }
        } else {
            paths.push(PathBuf::from("/tmp"));
            paths.push(PathBuf::from("/var/tmp"));
        }
        paths.dedup();
        paths
    }

    /// Where system-disk artifacts go.
    ///
    /// Prefers an existing allow-listed directory that `inventory` places on
    /// `disk` itself, since `/tmp` is often a RAM-backed mount. Falls back to
    /// the first existing allow-listed directory.
    pub fn artifact_dir(&self, disk: &DiskTarget, inventory: &dyn DiskInventory) -> Option<PathBuf> {
        let existing: Vec<&PathBuf> = self.allowed_paths.iter().filter(|p| p.is_dir()).collect();
        let on_disk = existing.iter().find(|dir| {
            let volume = resolve_disk(inventory, dir).or_else(|_| -> WipeResult<DiskTarget> {
                let real = std::fs::canonicalize(dir)?;
                resolve_disk(inventory, &real)
            });
            matches!(volume, Ok(volume) if volume.path == disk.path)
        });

        match on_disk {
            Some(dir) => Some((*dir).clone()),
            None => {
                let fallback = existing.first().map(|dir| (*dir).clone());
                if let Some(dir) = &fallback {
                    tracing::warn!(
                        disk = %disk.name(),
                        dir = %dir.display(),
                        "No allow-listed directory on the system disk, using another volume"
                    );
                }
                fallback
            }
        }
    }

    pub fn is_allowed_dir(&self, dir: &Path) -> bool {
        self.allowed_paths.iter().any(|allowed| dir.starts_with(allowed))
    }

    /// Decide whether `disk` may be wiped and under which limits.
    ///
    /// Non-system disks pass through with no limits.
    pub fn preflight(
        &self,
        disk: &DiskTarget,
        opt_in: SystemDiskOptIn,
        artifact_dir: &Path,
    ) -> WipeResult<Option<SystemDiskLimits>> {
        if !disk.is_system {
            return Ok(None);
        }

        if !opt_in.allow_system_disk {
            return Err(WipeError::SystemDiskRefused(format!(
                "{} is the system disk; wiping it requires an explicit opt-in",
                disk.name()
            )));
        }

        if disk.class.is_solid_state() && !(opt_in.force_wipe_ssd || self.force_wipe_ssd) {
            return Err(WipeError::SystemDiskRefused(format!(
                "{} is a solid-state system disk; overwriting it adds wear for little benefit, \
                 use the cipher engine or force the SSD wipe explicitly",
                disk.name()
            )));
        }

        if !self.is_allowed_dir(artifact_dir) {
            return Err(WipeError::SystemDiskRefused(format!(
                "artifact directory {} is outside the system-disk allow-list",
                artifact_dir.display()
            )));
        }

        tracing::warn!(
            disk = %disk.name(),
            max_temp_bytes = self.max_temp_bytes,
            timeout_secs = self.timeout.as_secs(),
            "System disk wipe granted under restricted limits"
        );

        Ok(Some(SystemDiskLimits {
            max_free_bytes: self.max_temp_bytes,
            max_chunk_bytes: self.max_buffer_bytes,
            max_concurrent_io: self.max_concurrent_io,
            timeout: self.timeout,
        }))
    }
}

/// Limits an operation must respect after a granted system-disk preflight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemDiskLimits {
    pub max_free_bytes: u64,
    pub max_chunk_bytes: u64,
    pub max_concurrent_io: usize,
    pub timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drives::StaticInventory;
    use crate::StorageClass;

    fn system_disk(class: StorageClass) -> DiskTarget {
        DiskTarget::new("/", class, 100 * GIB, 50 * GIB).with_system(true)
    }

    fn policy_with(dir: &Path) -> SystemDiskPolicy {
        SystemDiskPolicy {
            allowed_paths: vec![dir.to_path_buf()],
            ..Default::default()
        }
    }

    #[test]
    fn test_non_system_disk_has_no_limits() {
        let policy = SystemDiskPolicy::default();
        let disk = DiskTarget::new("/mnt/data", StorageClass::SSD, GIB, GIB);
        let limits = policy
            .preflight(&disk, SystemDiskOptIn::default(), Path::new("/mnt/data"))
            .unwrap();
        assert!(limits.is_none());
    }

    #[test]
    fn test_system_disk_requires_opt_in() {
        let policy = policy_with(Path::new("/tmp"));
        let err = policy
            .preflight(&system_disk(StorageClass::HDD), SystemDiskOptIn::default(), Path::new("/tmp"))
            .unwrap_err();
        assert!(matches!(err, WipeError::SystemDiskRefused(_)));
    }

    #[test]
    fn test_ssd_system_disk_recommends_cipher() {
        let policy = policy_with(Path::new("/tmp"));
        let opt_in = SystemDiskOptIn {
            allow_system_disk: true,
            force_wipe_ssd: false,
        };
        let err = policy
            .preflight(&system_disk(StorageClass::SSD), opt_in, Path::new("/tmp"))
            .unwrap_err();
        assert!(err.to_string().contains("cipher"));

        let forced = SystemDiskOptIn {
            allow_system_disk: true,
            force_wipe_ssd: true,
        };
        assert!(policy
            .preflight(&system_disk(StorageClass::SSD), forced, Path::new("/tmp"))
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_artifacts_confined_to_allow_list() {
        let policy = policy_with(Path::new("/tmp"));
        let opt_in = SystemDiskOptIn {
            allow_system_disk: true,
            force_wipe_ssd: false,
        };
        assert!(policy
            .preflight(&system_disk(StorageClass::HDD), opt_in, Path::new("/home/user"))
            .is_err());

        let limits = policy
            .preflight(&system_disk(StorageClass::HDD), opt_in, Path::new("/tmp/freewipe"))
            .unwrap()
            .unwrap();
        assert_eq!(limits.max_free_bytes, 2 * GIB);
        assert_eq!(limits.max_chunk_bytes, 256 * MIB);
        assert_eq!(limits.max_concurrent_io, 2);
        assert_eq!(limits.timeout, Duration::from_secs(1800));
    }

    #[test]
    fn test_default_allow_list_contains_temp_dir() {
        let policy = SystemDiskPolicy::default();
        assert!(policy.is_allowed_dir(&std::env::temp_dir()));
    }

    #[test]
    fn test_artifact_dir_prefers_system_volume() {
        let ram = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let system = DiskTarget::new(root.path(), StorageClass::HDD, 100 * GIB, 50 * GIB).with_system(true);
        let inventory = StaticInventory::new(vec![
            DiskTarget::new(ram.path(), StorageClass::Unknown, GIB, GIB),
            system.clone(),
        ]);
        let policy = SystemDiskPolicy {
            allowed_paths: vec![ram.path().to_path_buf(), root.path().join("missing"), root.path().to_path_buf()],
            ..Default::default()
        };

        assert_eq!(policy.artifact_dir(&system, &inventory), Some(root.path().to_path_buf()));
    }

    #[test]
    fn test_artifact_dir_falls_back_to_first_existing() {
        let ram = tempfile::tempdir().unwrap();
        let system = system_disk(StorageClass::HDD);
        let inventory = StaticInventory::single(DiskTarget::new(ram.path(), StorageClass::Unknown, GIB, GIB));
        let policy = SystemDiskPolicy {
            allowed_paths: vec![ram.path().join("missing"), ram.path().to_path_buf()],
            ..Default::default()
        };

        assert_eq!(policy.artifact_dir(&system, &inventory), Some(ram.path().to_path_buf()));

        let nothing = policy_with(&ram.path().join("missing"));
        assert!(nothing.artifact_dir(&system, &inventory).is_none());
    }
}
