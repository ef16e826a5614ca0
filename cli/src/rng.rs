//! The two `RandomnessSource` backends the CLI can hand to the generator.
//!
//! [`rulegen::RandomnessSource`] is not object-safe (`choice_arr` is
//! generic), so rather than boxing a trait object the CLI picks between
//! its two implementors with a small sum type and delegates by hand, the
//! same shape the teacher uses for `StoreContext`'s engine-choice enum.

use rand::{rngs::StdRng, SeedableRng};
use rulegen::{PrngSource, RandomnessSource, StreamSource};

pub enum Rng {
    Seeded(PrngSource<StdRng>),
    Stream(StreamSource),
}

impl Rng {
    pub fn seeded(seed: u64) -> Self {
        Rng::Seeded(PrngSource::new(StdRng::seed_from_u64(seed)))
    }

    pub fn stream(bytes: Vec<u8>) -> Self {
        Rng::Stream(StreamSource::new(bytes))
    }
}

impl RandomnessSource for Rng {
    fn int(&mut self, nbits: u32) -> u64 {
        match self {
            Rng::Seeded(rng) => rng.int(nbits),
            Rng::Stream(rng) => rng.int(nbits),
        }
    }

    fn choice(&mut self, n: usize) -> usize {
        match self {
            Rng::Seeded(rng) => rng.choice(n),
            Rng::Stream(rng) => rng.choice(n),
        }
    }

    fn choice_prob(&mut self, prob: f64) -> bool {
        match self {
            Rng::Seeded(rng) => rng.choice_prob(prob),
            Rng::Stream(rng) => rng.choice_prob(prob),
        }
    }

    fn float(&mut self) -> f32 {
        match self {
            Rng::Seeded(rng) => rng.float(),
            Rng::Stream(rng) => rng.float(),
        }
    }
}
