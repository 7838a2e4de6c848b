pub mod secure_rng;


// Re-export
pub use secure_rng::{secure_random_bytes, EntropySource, PatternRng, SystemEntropy};

use sha2::{Digest, Sha256};

/// Hex SHA-256 of `data`, used to fingerprint verification canaries
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
