// Free-space wiping
//
// - session.rs: one overwrite pass, filler artifacts and their cleanup
// - operation.rs: multi-pass operation record and the runner driving it
// - system_disk.rs: opt-in gate and limits for the OS disk
// - progress.rs: bounded, lossy progress channel

pub mod operation;
pub mod progress;
pub mod session;
pub mod system_disk;


pub use operation::{OperationStatus, WipeOperation, WipeRunner};
pub use progress::{progress_channel, ProgressSink, ProgressSnapshot};
pub use session::{SessionParams, SessionReport, SessionState, WipeSession};
pub use system_disk::{SystemDiskLimits, SystemDiskOptIn, SystemDiskPolicy};
