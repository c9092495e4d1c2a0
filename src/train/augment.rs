//! On-the-fly augmentation of positive samples: circular time shift,
//! gain scaling and additive noise from a pool of background clips.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::SAMPLE_RATE;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentConfig {
    /// Probability that a given positive sample is augmented at all.
    pub prob: f32,
    /// Upper bound for the noise mix ratio r in out = (1-r)s + rn.
    pub max_noise_ratio: f32,
    /// Time shift bound in milliseconds, applied circularly.
    pub max_shift_ms: usize,
    /// Gain varies in 1 +- max_gain.
    pub max_gain: f32,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        AugmentConfig {
            prob: 0.5,
            max_noise_ratio: 0.3,
            max_shift_ms: 100,
            max_gain: 0.2,
        }
    }
}

/// Augments positive samples during training. Owns its RNG so training
/// runs are reproducible given a seed; the noise pool is shared across
/// workers.
#[derive(Debug, Clone)]
pub struct Augmentor {
    config: AugmentConfig,
    noise_pool: Arc<Vec<Vec<f32>>>,
    rng: StdRng,
}

impl Augmentor {
    pub fn new(config: AugmentConfig, noise_pool: Vec<Vec<f32>>, seed: u64) -> Self {
        Augmentor {
            config,
            noise_pool: Arc::new(noise_pool),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// A copy of this augmentor with its own RNG stream, for a worker.
    pub fn reseeded(&self, seed: u64) -> Self {
        Augmentor {
            config: self.config.clone(),
            noise_pool: Arc::clone(&self.noise_pool),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Applies the augmentation pipeline with probability `prob`.
    /// The transform order is fixed: shift, then gain, then noise mix.
    pub fn augment(&mut self, samples: &[f32]) -> Vec<f32> {
        if self.rng.gen::<f32>() > self.config.prob {
            return samples.to_vec();
        }

        let mut out = samples.to_vec();

        if self.config.max_shift_ms > 0 {
            let max_shift = self.config.max_shift_ms * SAMPLE_RATE / 1000;
            if max_shift > 0 {
                let offset = self.rng.gen_range(0..max_shift * 2) as isize - max_shift as isize;
                out = shift(&out, offset);
            }
        }

        if self.config.max_gain > 0.0 {
            let gain = 1.0 + (self.rng.gen::<f32>() * 2.0 - 1.0) * self.config.max_gain;
            out = scale(&out, gain);
        }

        if self.config.max_noise_ratio > 0.0 && !self.noise_pool.is_empty() {
            let noise = &self.noise_pool[self.rng.gen_range(0..self.noise_pool.len())];
            let ratio = self.rng.gen::<f32>() * self.config.max_noise_ratio;

            let start = if noise.len() > out.len() {
                self.rng.gen_range(0..noise.len() - out.len())
            } else {
                0
            };
            out = mix_noise(&out, &noise[start..], ratio);
        }

        out
    }
}

/// Circular time shift: positive offsets move the signal later,
/// wrapping the tail to the front.
pub fn shift(samples: &[f32], offset: isize) -> Vec<f32> {
    let len = samples.len();
    if len == 0 {
        return Vec::new();
    }
    let mut out = samples.to_vec();
    let shift = offset.rem_euclid(len as isize) as usize;
    out.rotate_right(shift);
    out
}

pub fn scale(samples: &[f32], gain: f32) -> Vec<f32> {
    samples.iter().map(|&s| s * gain).collect()
}

/// Mixes noise into a signal at the given ratio, truncating to the
/// shorter of the two buffers.
pub fn mix_noise(signal: &[f32], noise: &[f32], ratio: f32) -> Vec<f32> {
    let len = signal.len().min(noise.len());
    let signal_ratio = 1.0 - ratio;
    (0..len)
        .map(|i| signal[i] * signal_ratio + noise[i] * ratio)
        .collect()
}
