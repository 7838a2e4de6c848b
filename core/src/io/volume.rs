// Filesystem surface used by wipe sessions

use crate::drives::trim::TrimOperations;
use crate::StorageClass;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A write handle that can be forced to stable storage.
pub trait DurableWrite: Write + Send {
    fn sync_durable(&mut self) -> io::Result<()>;
}

impl DurableWrite for File {
    fn sync_durable(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

impl<T: DurableWrite + ?Sized> DurableWrite for Box<T> {
    fn sync_durable(&mut self) -> io::Result<()> {
        (**self).sync_durable()
    }
}

/// Where filler artifacts live and how they are created and removed.
///
/// Sessions only ever touch the volume through this trait, which lets tests
/// drive them against simulated capacity and injected OS errors.
pub trait Volume: Send + Sync {
    /// Directory receiving filler artifacts
    fn artifact_dir(&self) -> &Path;

    /// Create (truncating) an artifact for writing
    fn create_artifact(&self, path: &Path) -> io::Result<Box<dyn DurableWrite>>;

    fn remove_artifact(&self, path: &Path) -> io::Result<()>;

    /// Pre-flight check: create and delete a scratch directory
    fn probe_writable(&self) -> io::Result<()>;

    /// Ask the filesystem to discard freed blocks
    fn trim(&self) -> io::Result<()>;
}

const PROBE_DIR_NAME: &str = ".freewipe_probe";

/// Real directory on a mounted filesystem
#[derive(Debug, Clone)]
pub struct LocalVolume {
    dir: PathBuf,
    class: StorageClass,
}

impl LocalVolume {
    pub fn new(dir: impl Into<PathBuf>, class: StorageClass) -> Self {
        Self {
            dir: dir.into(),
            class,
        }
    }

    pub fn class(&self) -> StorageClass {
        self.class
    }
}

impl Volume for LocalVolume {
    fn artifact_dir(&self) -> &Path {
        &self.dir
    }

    fn create_artifact(&self, path: &Path) -> io::Result<Box<dyn DurableWrite>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(file))
    }

    fn remove_artifact(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn probe_writable(&self) -> io::Result<()> {
        let probe = self.dir.join(PROBE_DIR_NAME);
        fs::create_dir_all(&probe)?;
        fs::remove_dir(&probe)
    }

    fn trim(&self) -> io::Result<()> {
        if !self.class.is_solid_state() {
            return Ok(());
        }
        TrimOperations::trim_volume(&self.dir)
    }
}
