//! Streaming detection engine.
//!
//! Owns one second of the most recent audio in a ring buffer, runs the
//! frozen model over it on every processed chunk, and turns the raw
//! per-frame probabilities into discrete detections through smoothing,
//! a consecutive-high-frame requirement and a warm-up gate.

use circular_buffer::CircularBuffer;
use log::warn;

use crate::audio::vad::Vad;
use crate::features::FeatureExtractor;
use crate::net::Sequential;
use crate::{HOP_SIZE, NUM_MEL_FILTERS, SAMPLE_RATE, WINDOW_SIZE};

/// Weight of the newest raw probability in the smoothed value.
const SMOOTHING_ALPHA: f32 = 0.3;
/// Decay applied to the smoothed value on every sub-threshold frame.
const SMOOTH_DECAY: f32 = 0.5;
/// Raw probability a frame must reach to count as "high".
const HIGH_THRESHOLD: f32 = 0.9;
/// High frames required in a row before a detection can fire.
const REQUIRED_CONSECUTIVE: usize = 5;

/// Per-chunk processing report, for the listener's debug line.
#[derive(Debug, Clone, Copy)]
pub struct ProcessInfo {
    pub raw_prob: f32,
    pub smooth_prob: f32,
    pub consecutive_high: usize,
    pub vad_active: bool,
    pub detected: bool,
}

pub struct Engine {
    model: Sequential,
    extractor: FeatureExtractor,
    vad: Vad,
    ring: Box<CircularBuffer<SAMPLE_RATE, f32>>,
    smooth_prob: f32,
    consecutive_high: usize,
    samples_ingested: usize,
}

impl Engine {
    pub fn new(model: Sequential, vad: Vad) -> Self {
        let extractor = FeatureExtractor::new(SAMPLE_RATE, WINDOW_SIZE, HOP_SIZE, NUM_MEL_FILTERS);
        let mut engine = Engine {
            model,
            extractor,
            vad,
            ring: CircularBuffer::boxed(),
            smooth_prob: 0.0,
            consecutive_high: 0,
            samples_ingested: 0,
        };
        engine.reset();
        engine
    }

    /// Slides the ring without running inference. Used to keep the
    /// buffer current while the power gate holds inference off; never
    /// touches the smoothed probability.
    pub fn push_samples(&mut self, chunk: &[f32]) {
        self.ring.extend_from_slice(chunk);
        self.samples_ingested += chunk.len();
    }

    /// Ingests a chunk, runs the model over the ring and applies the
    /// detection policy. Returns the smoothed probability and whether a
    /// detection fired.
    pub fn process(&mut self, chunk: &[f32], threshold: f32) -> (f32, bool) {
        let info = self.process_debug(chunk, threshold);
        (info.smooth_prob, info.detected)
    }

    pub fn process_debug(&mut self, chunk: &[f32], threshold: f32) -> ProcessInfo {
        self.push_samples(chunk);
        let warmup_complete = self.samples_ingested >= SAMPLE_RATE;
        let vad_active = self.vad.is_speech(chunk);

        let raw_prob = self.infer();

        if raw_prob < HIGH_THRESHOLD {
            self.smooth_prob *= SMOOTH_DECAY;
            self.consecutive_high = 0;
        } else {
            self.smooth_prob = SMOOTHING_ALPHA * raw_prob + (1.0 - SMOOTHING_ALPHA) * self.smooth_prob;
            self.consecutive_high += 1;
        }

        let detected = warmup_complete
            && self.consecutive_high >= REQUIRED_CONSECUTIVE
            && self.smooth_prob >= threshold;

        ProcessInfo {
            raw_prob,
            smooth_prob: self.smooth_prob,
            consecutive_high: self.consecutive_high,
            vad_active,
            detected,
        }
    }

    /// The engine never fails: an empty feature tensor or a model error
    /// reports probability zero for the frame.
    fn infer(&mut self) -> f32 {
        let samples: Vec<f32> = self.ring.iter().copied().collect();
        let Some(features) = self.extractor.extract(&samples) else {
            return 0.0;
        };
        match self.model.forward(&features) {
            Ok(out) => out.data.first().copied().unwrap_or(0.0),
            Err(e) => {
                warn!("Inference error: {e}");
                0.0
            }
        }
    }

    /// Clears the detection state and refills the ring with
    /// deterministic low-level noise. A zero-filled ring would present
    /// an artificial step edge to the model on the first audible chunk;
    /// the filler keeps the buffer statistically unremarkable.
    pub fn reset(&mut self) {
        self.smooth_prob = 0.0;
        self.consecutive_high = 0;
        self.samples_ingested = 0;
        self.vad.reset();
        self.model.reset_state();

        self.ring.clear();
        for i in 0..SAMPLE_RATE {
            self.ring.push_back(filler_noise(i));
        }
    }

    /// The current ring contents, oldest sample first.
    pub fn ring_snapshot(&self) -> Vec<f32> {
        self.ring.iter().copied().collect()
    }

    pub fn smooth_prob(&self) -> f32 {
        self.smooth_prob
    }

    pub fn consecutive_high(&self) -> usize {
        self.consecutive_high
    }
}

/// Index-keyed pseudo-random filler in roughly +-0.01.
fn filler_noise(i: usize) -> f32 {
    let mut h = (i as u32).wrapping_mul(2_654_435_761);
    h ^= h >> 16;
    ((h & 0xffff) as f32 / 65535.0 * 2.0 - 1.0) * 0.01
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::layer::Layer;
    use crate::net::tensor::Tensor;

    /// Dense(zero weights) + Sigmoid with the bias chosen so the model
    /// always outputs the given probability.
    fn constant_model(prob: f32) -> Sequential {
        let frames = (SAMPLE_RATE - WINDOW_SIZE) / HOP_SIZE + 1;
        let in_size = frames * NUM_MEL_FILTERS;
        let logit = (prob / (1.0 - prob)).ln();
        Sequential::new(vec![
            Layer::dense(Tensor::new(&[1, in_size]), vec![logit]),
            Layer::Sigmoid,
        ])
    }

    fn vad() -> Vad {
        Vad::new(0.01, 0.5, 300)
    }

    #[test]
    fn push_samples_never_touches_smoothing() {
        let mut engine = Engine::new(constant_model(0.95), vad());
        for _ in 0..20 {
            engine.push_samples(&vec![0.1; 1000]);
        }
        assert_eq!(engine.smooth_prob(), 0.0);
        assert_eq!(engine.consecutive_high(), 0);
    }

    #[test]
    fn detection_needs_five_consecutive_high_frames_after_warmup() {
        let mut engine = Engine::new(constant_model(0.95), vad());

        // Warm up the ring with ingest-only chunks: 16 x 1000 samples.
        for _ in 0..16 {
            engine.push_samples(&vec![0.05; 1000]);
        }

        // Five processed chunks: consecutive_high counts 1..=5 and the
        // detection fires exactly on the fifth.
        let expected = [(1, false), (2, false), (3, false), (4, false), (5, true)];
        for (want_consec, want_detected) in expected {
            let info = engine.process_debug(&vec![0.05; 1000], 0.5);
            assert_eq!(info.consecutive_high, want_consec);
            assert_eq!(info.detected, want_detected);
        }

        // After reset, the identical sequence reproduces the pattern.
        engine.reset();
        for _ in 0..16 {
            engine.push_samples(&vec![0.05; 1000]);
        }
        for (want_consec, want_detected) in expected {
            let info = engine.process_debug(&vec![0.05; 1000], 0.5);
            assert_eq!(info.consecutive_high, want_consec);
            assert_eq!(info.detected, want_detected);
        }
    }

    #[test]
    fn warmup_suppresses_detections() {
        let mut engine = Engine::new(constant_model(0.95), vad());
        // Only 10 chunks of 1000: never warmed up, never detected.
        for _ in 0..10 {
            let (_, detected) = engine.process(&vec![0.05; 1000], 0.1);
            assert!(!detected);
        }
    }

    #[test]
    fn low_raw_probability_decays_smoothing_and_resets_the_streak() {
        let mut high = Engine::new(constant_model(0.95), vad());
        for _ in 0..16 {
            high.push_samples(&vec![0.05; 1000]);
        }
        for _ in 0..3 {
            high.process(&vec![0.05; 1000], 0.5);
        }
        assert_eq!(high.consecutive_high(), 3);
        let peak = high.smooth_prob();
        assert!(peak > 0.0);

        // A model below the high threshold: smoothing halves each
        // frame and the streak stays at zero.
        let mut low = Engine::new(constant_model(0.5), vad());
        for _ in 0..16 {
            low.push_samples(&vec![0.05; 1000]);
        }
        let mut last = f32::MAX;
        for _ in 0..5 {
            let (smooth, detected) = low.process(&vec![0.05; 1000], 0.5);
            assert!(smooth <= last);
            assert!(!detected);
            assert_eq!(low.consecutive_high(), 0);
            last = smooth;
        }
    }

    #[test]
    fn smoothing_sequence_matches_the_update_rule() {
        let mut engine = Engine::new(constant_model(0.95), vad());
        for _ in 0..16 {
            engine.push_samples(&vec![0.05; 1000]);
        }

        let mut expected = 0.0f32;
        for _ in 0..5 {
            expected = SMOOTHING_ALPHA * 0.95 + (1.0 - SMOOTHING_ALPHA) * expected;
            let (smooth, _) = engine.process(&vec![0.05; 1000], 0.5);
            assert!((smooth - expected).abs() < 1e-3, "smooth {smooth} vs {expected}");
        }
    }

    #[test]
    fn oversized_chunk_keeps_the_tail() {
        let mut engine = Engine::new(constant_model(0.95), vad());
        let big: Vec<f32> = (0..SAMPLE_RATE * 2).map(|i| i as f32).collect();
        engine.push_samples(&big);
        let ring = engine.ring_snapshot();
        assert_eq!(ring.len(), SAMPLE_RATE);
        assert_eq!(ring[0], SAMPLE_RATE as f32);
        assert_eq!(ring[SAMPLE_RATE - 1], (SAMPLE_RATE * 2 - 1) as f32);
    }

    #[test]
    fn reset_fills_the_ring_with_low_level_noise() {
        let mut engine = Engine::new(constant_model(0.95), vad());
        engine.push_samples(&vec![0.9; SAMPLE_RATE]);
        engine.reset();

        let ring = engine.ring_snapshot();
        assert_eq!(ring.len(), SAMPLE_RATE);
        // Not zeros, but bounded around +-0.01.
        assert!(ring.iter().any(|&v| v != 0.0));
        assert!(ring.iter().all(|&v| v.abs() <= 0.011));

        // Deterministic: two resets produce identical fillers.
        let snapshot = engine.ring_snapshot();
        engine.reset();
        assert_eq!(engine.ring_snapshot(), snapshot);
    }
}
