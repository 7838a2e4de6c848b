// Fill patterns written by each overwrite pass

use super::strategy::OverwriteStrategy;
use crate::config::WipeMethod;
use crate::crypto::PatternRng;
use crate::WipeResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content of a filler chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPattern {
    /// 0x00 everywhere
    Zero,
    /// 0xFF everywhere
    Ones,
    /// Fresh CSPRNG output for every chunk
    Random,
}

impl FillPattern {
    /// Pattern for zero-based pass `pass` of `method`
    pub fn for_method(method: WipeMethod, pass: u32) -> Self {
        match method {
            WipeMethod::Random | WipeMethod::SdeleteCompatible => FillPattern::Random,
            WipeMethod::Zero => FillPattern::Zero,
            // DoD 5220.22-M style rotation: random, zero, random
            WipeMethod::DoD5220 => match pass % 3 {
                1 => FillPattern::Zero,
                _ => FillPattern::Random,
            },
        }
    }

    /// Pattern for a pass, honouring strategies that fix their own sequence
    pub fn for_pass(strategy: OverwriteStrategy, method: WipeMethod, pass: u32) -> Self {
        match strategy.mandated_patterns() {
            Some(patterns) => patterns[pass as usize % patterns.len()],
            None => Self::for_method(method, pass),
        }
    }

    /// Constant patterns only need filling once per buffer
    pub fn is_constant(&self) -> bool {
        !matches!(self, FillPattern::Random)
    }

    pub fn constant_byte(&self) -> Option<u8> {
        match self {
            FillPattern::Zero => Some(0x00),
            FillPattern::Ones => Some(0xFF),
            FillPattern::Random => None,
        }
    }
}

impl fmt::Display for FillPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FillPattern::Zero => write!(f, "zero"),
            FillPattern::Ones => write!(f, "0xFF"),
            FillPattern::Random => write!(f, "random"),
        }
    }
}

/// Produces chunk contents for one pattern.
pub struct PatternFiller {
    pattern: FillPattern,
    source: FillSource,
}

enum FillSource {
    Constant(u8),
    Random(PatternRng),
}

impl PatternFiller {
    pub fn new(pattern: FillPattern) -> WipeResult<Self> {
        let source = match pattern.constant_byte() {
            Some(byte) => FillSource::Constant(byte),
            None => FillSource::Random(PatternRng::new()?),
        };
        Ok(Self { pattern, source })
    }

    pub fn pattern(&self) -> FillPattern {
        self.pattern
    }

    /// Fill `buf` with the next chunk of the pattern.
    pub fn fill(&mut self, buf: &mut [u8]) -> WipeResult<()> {
        match &mut self.source {
            FillSource::Constant(byte) => {
                buf.fill(*byte);
                Ok(())
            }
            FillSource::Random(rng) => rng.fill(buf),
        }
    }
}
