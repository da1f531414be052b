//! Multinomial token sampling with an injectable random source.

use crate::Result;
use anyhow::anyhow;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tch::{Device, Kind, Tensor};

/// Draws one token id per batch row from a probability matrix.
pub trait TokenSampler {
    /// Samples from `probabilities` of shape (batch_size, vocab_size).
    fn sample(&mut self, probabilities: &Tensor) -> Result<Vec<i64>>;
}

/// Multinomial sampler backed by a seedable [`StdRng`].
#[derive(Debug, Clone)]
pub struct SeededSampler {
    rng: StdRng,
}

impl SeededSampler {
    /// Creates a reproducible sampler.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Creates a sampler seeded from the operating system.
    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl TokenSampler for SeededSampler {
    fn sample(&mut self, probabilities: &Tensor) -> Result<Vec<i64>> {
        let rows = Vec::<Vec<f32>>::try_from(
            &probabilities.to_kind(Kind::Float).to_device(Device::Cpu),
        )?;

        let mut tokens = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let distribution = WeightedIndex::new(row)
                .map_err(|e| anyhow!("Cannot sample from row {}: {}", index, e))?;
            tokens.push(distribution.sample(&mut self.rng) as i64);
        }
        Ok(tokens)
    }
}

impl<T: TokenSampler + ?Sized> TokenSampler for &mut T {
    fn sample(&mut self, probabilities: &Tensor) -> Result<Vec<i64>> {
        (**self).sample(probabilities)
    }
}
