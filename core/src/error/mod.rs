/// Error types for the wipe engine
///
/// Every fallible library operation returns [`WipeResult`]. Failures raised
/// while writing filler data are additionally classified by
/// [`classification::classify_io_error`] so the session can tell a full
/// volume (the expected way a pass ends) from a vanished device.
pub mod classification;

pub use classification::{classify_io_error, WriteFailureClass};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WipeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation timed out: {0}")]
    TimedOut(String),

    #[error("Device not ready: {0}")]
    DeviceUnavailable(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("System disk refused: {0}")]
    SystemDiskRefused(String),

    #[error("Disk not found: {0}")]
    DiskNotFound(String),

    #[error("Phase failed: {0}")]
    PhaseFailed(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Random source failure: {0}")]
    RandomSource(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

// Manual Clone implementation because std::io::Error doesn't implement Clone
impl Clone for WipeError {
    fn clone(&self) -> Self {
        match self {
            WipeError::Io(e) => WipeError::Io(std::io::Error::new(e.kind(), e.to_string())),
            WipeError::InvalidConfig(s) => WipeError::InvalidConfig(s.clone()),
            WipeError::Cancelled => WipeError::Cancelled,
            WipeError::TimedOut(s) => WipeError::TimedOut(s.clone()),
            WipeError::DeviceUnavailable(s) => WipeError::DeviceUnavailable(s.clone()),
            WipeError::WriteFailed(s) => WipeError::WriteFailed(s.clone()),
            WipeError::SystemDiskRefused(s) => WipeError::SystemDiskRefused(s.clone()),
            WipeError::DiskNotFound(s) => WipeError::DiskNotFound(s.clone()),
            WipeError::PhaseFailed(s) => WipeError::PhaseFailed(s.clone()),
            WipeError::VerificationFailed(s) => WipeError::VerificationFailed(s.clone()),
            WipeError::RandomSource(s) => WipeError::RandomSource(s.clone()),
            WipeError::Settings(e) => WipeError::InvalidConfig(e.to_string()),
        }
    }
}

impl From<crate::control::Interruption> for WipeError {
    fn from(interruption: crate::control::Interruption) -> Self {
        match interruption {
            crate::control::Interruption::Cancelled => WipeError::Cancelled,
            crate::control::Interruption::DeadlineExceeded => {
                WipeError::TimedOut("deadline exceeded".to_string())
            }
        }
    }
}

impl WipeError {
    /// True for errors caused by the caller stopping the work rather than by a fault.
    pub fn is_interruption(&self) -> bool {
        matches!(self, WipeError::Cancelled | WipeError::TimedOut(_))
    }
}

pub type WipeResult<T> = Result<T, WipeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Interruption;

    #[test]
    fn test_error_display() {
        let err = WipeError::SystemDiskRefused("opt-in required".to_string());
        assert!(err.to_string().contains("System disk refused"));
        assert!(err.to_string().contains("opt-in required"));
    }

    #[test]
    fn test_io_error_clone_keeps_kind() {
        let err = WipeError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        match err.clone() {
            WipeError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            other => panic!("unexpected clone: {:?}", other),
        }
    }

    #[test]
    fn test_interruption_conversion() {
        assert!(matches!(
            WipeError::from(Interruption::Cancelled),
            WipeError::Cancelled
        ));
        let timed_out = WipeError::from(Interruption::DeadlineExceeded);
        assert!(matches!(timed_out, WipeError::TimedOut(_)));
        assert!(timed_out.is_interruption());
        assert!(!WipeError::WriteFailed("x".into()).is_interruption());
    }
}
