use crate::{WipeError, WipeResult};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use ring::rand::{SecureRandom, SystemRandom};

/// Bytes drawn from one seed before the generator reseeds from the OS (1 GiB)
pub const RESEED_INTERVAL: u64 = 1024 * 1024 * 1024;

/// Largest request passed to the OS source in one call
const OS_FILL_CHUNK: usize = 1024 * 1024;

/// Trait for entropy sources
pub trait EntropySource: Send + Sync {
    /// Fill buffer with random bytes
    fn fill_bytes(&self, dest: &mut [u8]) -> WipeResult<()>;
    /// Get source name for logging
    fn name(&self) -> &str;
}

/// Ring-based system random (uses OS facilities)
pub struct SystemEntropy {
    rng: SystemRandom,
}

impl SystemEntropy {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }
}

impl Default for SystemEntropy {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropySource for SystemEntropy {
    fn fill_bytes(&self, dest: &mut [u8]) -> WipeResult<()> {
        for chunk in dest.chunks_mut(OS_FILL_CHUNK) {
            self.rng
                .fill(chunk)
                .map_err(|_| WipeError::RandomSource("system RNG failure".to_string()))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "SystemRandom"
    }
}

/// Fill `dest` straight from the OS CSPRNG.
pub fn secure_random_bytes(dest: &mut [u8]) -> WipeResult<()> {
    SystemEntropy::new().fill_bytes(dest)
}

/// Fast stream of filler bytes for random overwrite passes.
///
/// A ChaCha-based generator seeded from an [`EntropySource`] and reseeded every
/// [`RESEED_INTERVAL`] bytes, so every chunk is fresh output and no stretch of
/// an artifact repeats another.
pub struct PatternRng {
    source: Box<dyn EntropySource>,
    generator: StdRng,
    bytes_since_reseed: u64,
    reseed_interval: u64,
}

impl PatternRng {
    pub fn new() -> WipeResult<Self> {
        Self::with_source(Box::new(SystemEntropy::new()), RESEED_INTERVAL)
    }

    pub fn with_source(source: Box<dyn EntropySource>, reseed_interval: u64) -> WipeResult<Self> {
        let generator = Self::seeded(source.as_ref())?;
        Ok(Self {
            source,
            generator,
            bytes_since_reseed: 0,
            reseed_interval,
        })
    }

    fn seeded(source: &dyn EntropySource) -> WipeResult<StdRng> {
        let mut seed = <StdRng as SeedableRng>::Seed::default();
        source.fill_bytes(&mut seed)?;
        Ok(StdRng::from_seed(seed))
    }

    pub fn fill(&mut self, dest: &mut [u8]) -> WipeResult<()> {
        if self.bytes_since_reseed >= self.reseed_interval {
            tracing::trace!(source = self.source.name(), "Reseeding pattern generator");
            self.generator = Self::seeded(self.source.as_ref())?;
            self.bytes_since_reseed = 0;
        }
        self.generator.fill_bytes(dest);
        self.bytes_since_reseed += dest.len() as u64;
        Ok(())
    }
}
