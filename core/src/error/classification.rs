/// Write failure classification
///
/// Filling free space deliberately runs the volume out of room, so "disk full"
/// is the normal way a pass ends. This module separates that outcome from a
/// device that went away and from every other I/O fault.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// How a failed write or sync should end the current pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteFailureClass {
    /// Volume has no space left - the pass completed
    VolumeFull,

    /// Device disappeared or is not ready - the pass failed
    DeviceNotReady,

    /// Any other I/O error - the pass failed
    Fatal,
}

impl WriteFailureClass {
    /// Get human-readable description of the failure class
    pub fn description(&self) -> &'static str {
        match self {
            WriteFailureClass::VolumeFull => "Volume is full, free space exhausted",
            WriteFailureClass::DeviceNotReady => "Device is not ready or was removed",
            WriteFailureClass::Fatal => "Unrecoverable write error",
        }
    }

    /// A full volume is the success condition of a pass
    pub fn is_success(&self) -> bool {
        matches!(self, WriteFailureClass::VolumeFull)
    }
}

impl fmt::Display for WriteFailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteFailureClass::VolumeFull => write!(f, "VolumeFull"),
            WriteFailureClass::DeviceNotReady => write!(f, "DeviceNotReady"),
            WriteFailureClass::Fatal => write!(f, "Fatal"),
        }
    }
}

#[cfg(unix)]
const VOLUME_FULL_CODES: &[i32] = &[libc::ENOSPC, libc::EDQUOT];
#[cfg(unix)]
const DEVICE_NOT_READY_CODES: &[i32] = &[libc::ENODEV, libc::ENXIO];

// ERROR_DISK_FULL, ERROR_HANDLE_DISK_FULL
#[cfg(windows)]
const VOLUME_FULL_CODES: &[i32] = &[112, 39];
// ERROR_NOT_READY
#[cfg(windows)]
const DEVICE_NOT_READY_CODES: &[i32] = &[21];

#[cfg(not(any(unix, windows)))]
const VOLUME_FULL_CODES: &[i32] = &[];
#[cfg(not(any(unix, windows)))]
const DEVICE_NOT_READY_CODES: &[i32] = &[];

const VOLUME_FULL_MESSAGES: &[&str] = &[
    "no space",
    "disk full",
    "not enough space",
    "quota exceeded",
];
const DEVICE_NOT_READY_MESSAGES: &[&str] = &["not ready", "no such device"];

/// Classify an error returned by a write or sync on a filler artifact.
///
/// Platform error codes win; the message is only consulted when the error
/// carries no OS code (wrapped or synthesized errors).
pub fn classify_io_error(err: &io::Error) -> WriteFailureClass {
    if let Some(code) = err.raw_os_error() {
        if VOLUME_FULL_CODES.contains(&code) {
            return WriteFailureClass::VolumeFull;
        }
        if DEVICE_NOT_READY_CODES.contains(&code) {
            return WriteFailureClass::DeviceNotReady;
        }
        return WriteFailureClass::Fatal;
    }

    if err.kind() == io::ErrorKind::WriteZero {
        return WriteFailureClass::VolumeFull;
    }

    classify_message(&err.to_string())
}

fn classify_message(message: &str) -> WriteFailureClass {
    let lower = message.to_lowercase();
    if VOLUME_FULL_MESSAGES.iter().any(|m| lower.contains(m)) {
        WriteFailureClass::VolumeFull
    } else if DEVICE_NOT_READY_MESSAGES.iter().any(|m| lower.contains(m)) {
        WriteFailureClass::DeviceNotReady
    } else {
        WriteFailureClass::Fatal
    }
}
