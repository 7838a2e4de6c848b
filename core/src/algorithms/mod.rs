pub mod pattern;
pub mod strategy;


// Re-export the overwrite policies
pub use pattern::{FillPattern, PatternFiller};
pub use strategy::{OverwriteStrategy, CIPHER_PATTERNS};
