/// Simulated volume for driving wipe operations without touching a disk
///
/// Tracks capacity in memory and can inject OS errors or raise a
/// cancellation once a byte threshold is crossed.
use freewipe::io::{DurableWrite, Volume};
use freewipe::CancelToken;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
enum Fault {
    /// Fail with a raw OS error once this many bytes are live
    OsError { live_bytes: u64, code: i32 },
    /// Cancel the token once this many bytes were written in total
    Cancel { total_bytes: u64, token: CancelToken },
}

#[derive(Default)]
struct VolumeState {
    capacity: u64,
    used: u64,
    total_written: u64,
    files: HashMap<PathBuf, u64>,
    created: usize,
    removed: usize,
    trims: usize,
}

pub struct MockVolume {
    dir: PathBuf,
    state: Arc<Mutex<VolumeState>>,
    fault: Option<Fault>,
    probe_fails: bool,
}

impl MockVolume {
    pub fn new(capacity: u64) -> Self {
        Self {
            dir: PathBuf::from("/mock/volume"),
            state: Arc::new(Mutex::new(VolumeState {
                capacity,
                ..Default::default()
            })),
            fault: None,
            probe_fails: false,
        }
    }

    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn fail_after(mut self, live_bytes: u64, code: i32) -> Self {
        self.fault = Some(Fault::OsError { live_bytes, code });
        self
    }

    pub fn cancel_after(mut self, total_bytes: u64, token: CancelToken) -> Self {
        self.fault = Some(Fault::Cancel { total_bytes, token });
        self
    }

    pub fn failing_probe(mut self) -> Self {
        self.probe_fails = true;
        self
    }

    pub fn live_files(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }

    pub fn used(&self) -> u64 {
        self.state.lock().unwrap().used
    }

    pub fn total_written(&self) -> u64 {
        self.state.lock().unwrap().total_written
    }

    pub fn created(&self) -> usize {
        self.state.lock().unwrap().created
    }

    pub fn removed(&self) -> usize {
        self.state.lock().unwrap().removed
    }

    pub fn trims(&self) -> usize {
        self.state.lock().unwrap().trims
    }
}

struct MockHandle {
    path: PathBuf,
    state: Arc<Mutex<VolumeState>>,
    fault: Option<Fault>,
}

impl Write for MockHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();

        let mut room = state.capacity - state.used;
        if let Some(Fault::OsError { live_bytes, code }) = &self.fault {
            if state.used >= *live_bytes {
                return Err(io::Error::from_raw_os_error(*code));
            }
            room = room.min(live_bytes - state.used);
        }

        let n = (buf.len() as u64).min(room);
        state.used += n;
        state.total_written += n;
        *state.files.entry(self.path.clone()).or_insert(0) += n;

        if let Some(Fault::Cancel { total_bytes, token }) = &self.fault {
            if state.total_written >= *total_bytes {
                token.cancel();
            }
        }
        Ok(n as usize)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DurableWrite for MockHandle {
    fn sync_durable(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Volume for MockVolume {
    fn artifact_dir(&self) -> &Path {
        &self.dir
    }

    fn create_artifact(&self, path: &Path) -> io::Result<Box<dyn DurableWrite>> {
        let mut state = self.state.lock().unwrap();
        state.files.insert(path.to_path_buf(), 0);
        state.created += 1;
        Ok(Box::new(MockHandle {
            path: path.to_path_buf(),
            state: self.state.clone(),
            fault: self.fault.clone(),
        }))
    }

    fn remove_artifact(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.files.remove(path) {
            Some(size) => {
                state.used -= size;
                state.removed += 1;
                Ok(())
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such artifact")),
        }
    }

    fn probe_writable(&self) -> io::Result<()> {
        if self.probe_fails {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only file system",
            ));
        }
        Ok(())
    }

    fn trim(&self) -> io::Result<()> {
        self.state.lock().unwrap().trims += 1;
        Ok(())
    }
}
