// Per-photon random number streams.
//
// Every photon gets its own generator whose state is derived from the run
// seed and the photon index, so histories can be traced in any order (or on
// any thread) and still draw the same random numbers.

use rand::{RngCore, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

/// LCG multiplier
const PRN_MULT: u64 = 6364136223846793005;
/// LCG increment
const PRN_ADD: u64 = 1442695040888963407;
/// RXS-M-XS output multiplier
const OUTPUT_MULT: u64 = 12605985483714917081;
/// Golden-ratio increment of the SplitMix64 seed mixer
const SPLITMIX_GAMMA: u64 = 0x9E3779B97F4A7C15;

/// PCG generator: 64-bit LCG state with an RXS-M-XS output permutation.
///
/// Reference: O'Neill, "PCG: A Family of Simple Fast Space-Efficient
/// Statistically Good Algorithms for Random Number Generation" (2014)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FastRng {
    state: u64,
}

impl FastRng {
    pub fn new(state: u64) -> Self {
        Self { state }
    }

    /// Generator for one photon history.
    ///
    /// The run seed and the photon index are mixed through SplitMix64 so that
    /// neighbouring photons start from decorrelated states.
    pub fn for_photon(run_seed: u64, photon_index: u64) -> Self {
        Self::new(splitmix64(run_seed ^ splitmix64(photon_index.wrapping_add(SPLITMIX_GAMMA))))
    }

    /// Uniform f64 in [0, 1) from the top 53 bits of the next output.
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

/// Resolve the configured seed: negative values request a clock-based seed.
pub fn resolve_seed(seed: i64) -> u64 {
    if seed >= 0 {
        return seed as u64;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    splitmix64(nanos)
}

#[inline]
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(SPLITMIX_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

impl SeedableRng for FastRng {
    type Seed = [u8; 8];

    fn from_seed(seed: [u8; 8]) -> Self {
        Self::new(u64::from_le_bytes(seed))
    }
}

impl RngCore for FastRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let old = self.state;
        self.state = old.wrapping_mul(PRN_MULT).wrapping_add(PRN_ADD);
        let shift = (self.state >> 59) + 5;
        let word = ((self.state >> shift) ^ self.state).wrapping_mul(OUTPUT_MULT);
        word ^ (word >> 43)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
