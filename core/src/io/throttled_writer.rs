// Rate-limited, mutex-serialized writer over a durable handle

use super::volume::DurableWrite;
use crate::control::RunContext;
use std::io;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Error payload carried by operations on a closed writer
#[derive(Debug, Error)]
#[error("throttled writer is closed")]
pub struct WriterClosed;

/// True when `err` came from using a [`ThrottledWriter`] after `close()`.
pub fn is_closed_error(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<WriterClosed>())
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, WriterClosed)
}

struct WriterState<W> {
    handle: Option<W>,
    last_write: Instant,
}

/// Wraps a write handle and caps its sustained throughput.
///
/// Before each write the writer computes how long `len` bytes should take at
/// the configured rate and sleeps for whatever part of that has not already
/// elapsed since the previous write. All operations go through one mutex, so
/// concurrent callers are serialized.
pub struct ThrottledWriter<W: DurableWrite> {
    state: Mutex<WriterState<W>>,
    rate_mbps: f64,
    context: Option<RunContext>,
}

impl<W: DurableWrite> ThrottledWriter<W> {
    /// `rate_mbps` of zero (or less) disables pacing.
    pub fn new(handle: W, rate_mbps: f64) -> Self {
        Self {
            state: Mutex::new(WriterState {
                handle: Some(handle),
                last_write: Instant::now(),
            }),
            rate_mbps,
            context: None,
        }
    }

    /// Make pacing sleeps observe cancellation and the context deadline.
    pub fn with_context(mut self, context: RunContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn rate_mbps(&self) -> f64 {
        self.rate_mbps
    }

    fn pacing_delay(&self, len: usize, since_last: Duration) -> Option<Duration> {
        if self.rate_mbps <= 0.0 || len == 0 {
            return None;
        }
        let expected = Duration::from_secs_f64(len as f64 / (self.rate_mbps * BYTES_PER_MB));
        expected.checked_sub(since_last).filter(|d| !d.is_zero())
    }

    fn pause(&self, delay: Duration) -> io::Result<()> {
        match &self.context {
            Some(ctx) => ctx
                .sleep(delay)
                .map_err(|why| io::Error::new(io::ErrorKind::Interrupted, why.to_string())),
            None => {
                std::thread::sleep(delay);
                Ok(())
            }
        }
    }

    /// Write the whole buffer, returning the number of bytes accepted.
    ///
    /// A short count is returned when the handle fails part way; the error is
    /// only surfaced if nothing was written.
    pub fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.handle.is_none() {
            return Err(closed_error());
        }

        if let Some(delay) = self.pacing_delay(data.len(), state.last_write.elapsed()) {
            self.pause(delay)?;
        }

        let handle = state.handle.as_mut().ok_or_else(closed_error)?;
        let mut written = 0;
        let result = loop {
            if written == data.len() {
                break Ok(written);
            }
            match handle.write(&data[written..]) {
                Ok(0) => {
                    break Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "failed to write whole chunk",
                    ))
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        state.last_write = Instant::now();

        match result {
            Err(e) if written == 0 => Err(e),
            Err(e) => Err(PartialWrite::wrap(written, e)),
            Ok(n) => Ok(n),
        }
    }

    /// Flush buffered data and force it to stable storage.
    pub fn sync(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = state.handle.as_mut().ok_or_else(closed_error)?;
        handle.flush()?;
        handle.sync_durable()
    }

    /// Release the handle. Idempotent; later writes and syncs fail.
    pub fn close(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.handle.take() {
            Some(mut handle) => handle.flush(),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle
            .is_none()
    }
}

/// Error raised after some bytes of a chunk were already accepted
#[derive(Debug, Error)]
#[error("wrote {written} bytes before failing: {source}")]
pub struct PartialWrite {
    pub written: usize,
    #[source]
    pub source: io::Error,
}

impl PartialWrite {
    fn wrap(written: usize, source: io::Error) -> io::Error {
        let kind = source.kind();
        io::Error::new(kind, PartialWrite { written, source })
    }

    /// Bytes accepted before `err`, zero when `err` is not a partial write.
    pub fn bytes_written(err: &io::Error) -> usize {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<PartialWrite>())
            .map(|p| p.written)
            .unwrap_or(0)
    }

    /// The underlying OS error, unwrapping a partial write if needed.
    pub fn root_cause(err: &io::Error) -> &io::Error {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<PartialWrite>())
            .map(|p| &p.source)
            .unwrap_or(err)
    }
}
