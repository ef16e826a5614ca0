//! Uniform randomness primitives (§C2).
//!
//! `wasm-rulegen` never reaches for floating point probabilities or raw
//! bit-fiddling directly in generation code; every random decision goes
//! through this narrow trait, so that a single swap from a seeded PRNG to
//! a coverage-guided byte stream changes how *every* decision in the
//! generator is made without touching the generator itself.

use alloc::vec::Vec;
use rand::RngCore;

/// A source of uniform random primitives used throughout generation.
///
/// Implementors: [`PrngSource`] (seeded PRNG, for plain fuzzing) and
/// [`StreamSource`] (consumes a fixed byte buffer, for coverage-guided
/// front-ends that mutate the consumed bytes directly).
pub trait RandomnessSource {
    /// Uniform unsigned integer in `[0, 2^nbits)`. `nbits` must be `> 0`.
    fn int(&mut self, nbits: u32) -> u64;

    /// Uniform index in `[0, n)`. `n` must be `> 0`.
    fn choice(&mut self, n: usize) -> usize;

    /// `true` with probability `prob`, clamped to `[0.0, 1.0]`.
    fn choice_prob(&mut self, prob: f64) -> bool;

    /// A geometric draw: repeatedly flip a fair coin, counting successes
    /// until the first failure.
    fn choice_exp(&mut self) -> u32 {
        let mut choice = 0;
        while self.int(1) == 1 {
            choice += 1;
        }
        choice
    }

    /// Picks one element of `arr` uniformly. Panics if `arr` is empty.
    fn choice_arr<'a, T>(&mut self, arr: &'a [T]) -> &'a T {
        assert!(!arr.is_empty(), "choice_arr requires a non-empty slice");
        let idx = self.choice(arr.len());
        &arr[idx]
    }

    /// A raw 32-bit IEEE-754 float drawn from 4 uniformly random bytes
    /// (including NaNs and infinities, matching the reference generator).
    fn float(&mut self) -> f32;
}

/// Seeded pseudo-random implementation backing plain (non-coverage-guided)
/// fuzzing runs.
#[derive(Debug, Clone)]
pub struct PrngSource<R> {
    rng: R,
}

impl<R> PrngSource<R>
where
    R: RngCore,
{
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R> RandomnessSource for PrngSource<R>
where
    R: RngCore,
{
    fn int(&mut self, nbits: u32) -> u64 {
        assert!(nbits > 0 && nbits <= 64, "nbits must be in 1..=64");
        if nbits == 64 {
            return self.rng.next_u64();
        }
        let mask = (1u64 << nbits) - 1;
        self.rng.next_u64() & mask
    }

    fn choice(&mut self, n: usize) -> usize {
        assert!(n > 0, "choice requires n > 0");
        (self.rng.next_u64() % n as u64) as usize
    }

    fn choice_prob(&mut self, prob: f64) -> bool {
        let prob = prob.clamp(0.0, 1.0);
        let sample = (self.rng.next_u32() as f64) / (u32::MAX as f64 + 1.0);
        sample < prob
    }

    fn float(&mut self) -> f32 {
        f32::from_bits(self.rng.next_u32())
    }
}

/// A [`RandomnessSource`] that consumes bytes from the *tail* of a fixed
/// seed buffer, big-endian, zero-padding once the buffer is exhausted.
///
/// This mirrors `ConsumeRng` in the reference generator: coverage-guided
/// front-ends (e.g. libFuzzer-style mutators) hand the generator a mutated
/// byte string directly, and want every draw to map deterministically and
/// densely onto a prefix of that string so mutations have a stable effect
/// on the decisions they influence.
#[derive(Debug, Clone)]
pub struct StreamSource {
    seed: Vec<u8>,
}

impl StreamSource {
    pub fn new(seed: Vec<u8>) -> Self {
        Self { seed }
    }

    /// Consumes `nbytes` from the tail of the buffer, big-endian, zero
    /// padding on the left once the buffer runs out.
    fn consume(&mut self, nbytes: usize) -> Vec<u8> {
        if self.seed.len() >= nbytes {
            let split_at = self.seed.len() - nbytes;
            let tail = self.seed.split_off(split_at);
            tail
        } else {
            let mut padded = alloc::vec![0u8; nbytes - self.seed.len()];
            padded.extend_from_slice(&self.seed);
            self.seed.clear();
            padded
        }
    }

    fn consume_uint(&mut self, nbits: u32) -> u64 {
        let nbytes = ((nbits + 7) / 8) as usize;
        let bytes = self.consume(nbytes);
        let mut value: u64 = 0;
        for byte in bytes {
            value = (value << 8) | byte as u64;
        }
        let mask = if nbits >= 64 { u64::MAX } else { (1u64 << nbits) - 1 };
        value & mask
    }

    /// Remaining unconsumed bytes, exposed so the CLI/tests can report how
    /// much of a coverage-guided input was actually used.
    pub fn remaining(&self) -> usize {
        self.seed.len()
    }
}

impl RandomnessSource for StreamSource {
    fn int(&mut self, nbits: u32) -> u64 {
        assert!(nbits > 0 && nbits <= 64, "nbits must be in 1..=64");
        self.consume_uint(nbits)
    }

    fn choice(&mut self, n: usize) -> usize {
        assert!(n > 0, "choice requires n > 0");
        if n == 1 {
            return 0;
        }
        let nbits = usize::BITS - (n - 1).leading_zeros();
        (self.consume_uint(nbits) % n as u64) as usize
    }

    fn choice_prob(&mut self, prob: f64) -> bool {
        let prob = prob.clamp(0.0, 1.0);
        // Mantissa of a 32-bit float is 23 bits.
        let value = self.consume_uint(23) as f64 / (1u64 << 23) as f64;
        value >= 1.0 - prob
    }

    fn float(&mut self) -> f32 {
        let bytes = self.consume(4);
        f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn prng_choice_stays_in_bounds() {
        let mut src = PrngSource::new(rand::rngs::StdRng::seed_from_u64(42));
        for _ in 0..1000 {
            let value = src.choice(7);
            assert!(value < 7);
        }
    }

    #[test]
    fn stream_source_zero_pads_once_exhausted() {
        let mut src = StreamSource::new(Vec::new());
        assert_eq!(src.int(8), 0);
        assert_eq!(src.choice(4), 0);
    }

    #[test]
    fn stream_source_consumes_from_the_tail() {
        let mut src = StreamSource::new(alloc::vec![0x01, 0x02, 0x03]);
        assert_eq!(src.int(8), 0x03);
        assert_eq!(src.int(8), 0x02);
        assert_eq!(src.int(8), 0x01);
        assert_eq!(src.int(8), 0);
    }

    #[test]
    fn choice_prob_is_deterministic_for_stream_source() {
        let mut always_true = StreamSource::new(alloc::vec![0xff, 0xff, 0xff]);
        assert!(always_true.choice_prob(1.0));
        let mut always_false = StreamSource::new(alloc::vec![0x00, 0x00, 0x00]);
        assert!(!always_false.choice_prob(0.0));
    }
}
