use crate::{DiskTarget, StorageClass, WipeError, WipeResult};
use std::path::{Path, PathBuf};
use sysinfo::{DiskKind, Disks};

/// Source of the volumes that can be wiped and verified.
#[cfg_attr(test, mockall::automock)]
pub trait DiskInventory: Send + Sync {
    /// Enumerate mounted volumes with current free space.
    fn disks(&self) -> WipeResult<Vec<DiskTarget>>;
}

/// Volume whose root is the longest prefix of `path`.
pub fn resolve_disk(inventory: &dyn DiskInventory, path: &Path) -> WipeResult<DiskTarget> {
    inventory
        .disks()?
        .into_iter()
        .filter(|disk| path.starts_with(&disk.path))
        .max_by_key(|disk| disk.path.components().count())
        .ok_or_else(|| WipeError::DiskNotFound(path.display().to_string()))
}

/// Live inventory backed by `sysinfo`
#[derive(Debug, Default, Clone)]
pub struct SysinfoInventory;

impl SysinfoInventory {
    pub fn new() -> Self {
        Self
    }

    fn classify(kind: DiskKind) -> StorageClass {
        match kind {
            DiskKind::SSD => StorageClass::SSD,
            DiskKind::HDD => StorageClass::HDD,
            DiskKind::Unknown(_) => StorageClass::Unknown,
        }
    }

    fn is_system_mount(mount: &Path) -> bool {
        if cfg!(windows) {
            let system_drive = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
            mount
                .to_string_lossy()
                .to_ascii_uppercase()
                .starts_with(&system_drive.to_ascii_uppercase())
        } else {
            mount == Path::new("/")
        }
    }

    fn is_writable(mount: &Path) -> bool {
        std::fs::metadata(mount)
            .map(|meta| !meta.permissions().readonly())
            .unwrap_or(false)
    }
}

impl DiskInventory for SysinfoInventory {
    fn disks(&self) -> WipeResult<Vec<DiskTarget>> {
        let disks = Disks::new_with_refreshed_list();
        let targets: Vec<DiskTarget> = disks
            .list()
            .iter()
            .map(|disk| {
                let mount = disk.mount_point().to_path_buf();
                DiskTarget {
                    class: Self::classify(disk.kind()),
                    total_bytes: disk.total_space(),
                    free_bytes: disk.available_space(),
                    is_system: Self::is_system_mount(&mount),
                    is_writable: Self::is_writable(&mount),
                    path: mount,
                }
            })
            .collect();

        tracing::debug!(count = targets.len(), "Enumerated volumes");
        Ok(targets)
    }
}

/// Fixed list of volumes, for tests and for callers that already know their targets
#[derive(Debug, Default, Clone)]
pub struct StaticInventory {
    disks: Vec<DiskTarget>,
}

impl StaticInventory {
    pub fn new(disks: Vec<DiskTarget>) -> Self {
        Self { disks }
    }

    pub fn single(disk: DiskTarget) -> Self {
        Self { disks: vec![disk] }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.disks.iter().map(|d| d.path.clone()).collect()
    }
}

impl DiskInventory for StaticInventory {
    fn disks(&self) -> WipeResult<Vec<DiskTarget>> {
        Ok(self.disks.clone())
    }
}
