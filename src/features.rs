//! Converts raw audio into the log-Mel tensor the network consumes.
//!
//! The exact pipeline (pre-emphasis, STFT, Mel filterbank, log scaling)
//! and its constants must match between training and inference; the
//! extractor is the single implementation both sides share.

use crate::audio::dsp::{pre_emphasis, stft};
use crate::audio::mel::{apply_filterbank, mel_filterbank};
use crate::net::tensor::Tensor;

/// Pre-emphasis coefficient applied before the STFT.
pub const PRE_EMPHASIS_COEFF: f32 = 0.97;

/// Scale applied inside the log compression: ln(1 + 1000 * v).
const LOG_SCALE: f32 = 1000.0;

/// Log-Mel feature extractor with a cached filterbank.
///
/// The filterbank is a pure function of (num_mel, window_size,
/// sample_rate), so it is built once at construction.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    sample_rate: usize,
    window_size: usize,
    hop_size: usize,
    num_mel: usize,
    filterbank: Vec<Vec<f32>>,
}

impl FeatureExtractor {
    pub fn new(sample_rate: usize, window_size: usize, hop_size: usize, num_mel: usize) -> Self {
        let filterbank = mel_filterbank(
            num_mel,
            window_size,
            sample_rate,
            0.0,
            sample_rate as f64 / 2.0,
        );
        FeatureExtractor {
            sample_rate,
            window_size,
            hop_size,
            num_mel,
            filterbank,
        }
    }

    /// Number of STFT frames produced for a clip of `len` samples.
    pub fn frames_for_len(&self, len: usize) -> usize {
        if len < self.window_size {
            return 0;
        }
        (len - self.window_size) / self.hop_size + 1
    }

    /// Feature tensor shape for a clip of `len` samples: [1, frames, mel].
    pub fn output_shape(&self, len: usize) -> Vec<usize> {
        vec![1, self.frames_for_len(len), self.num_mel]
    }

    /// Extracts a [1, frames, num_mel] log-Mel tensor from the samples.
    ///
    /// Returns `None` when the clip is too short to produce a single
    /// STFT frame.
    pub fn extract(&self, samples: &[f32]) -> Option<Tensor> {
        let emphasized = pre_emphasis(samples, PRE_EMPHASIS_COEFF);
        let spectrogram = stft(&emphasized, self.window_size, self.hop_size);
        if spectrogram.is_empty() {
            return None;
        }

        let frames = spectrogram.len();
        let mut data = Vec::with_capacity(frames * self.num_mel);
        for frame in &spectrogram {
            let mel = apply_filterbank(frame, &self.filterbank);
            data.extend(mel.iter().map(|&v| (LOG_SCALE * v).ln_1p()));
        }

        Some(Tensor::from_vec(data, &[1, frames, self.num_mel]))
    }

    pub fn num_mel(&self) -> usize {
        self.num_mel
    }

    pub fn sample_rate(&self) -> usize {
        self.sample_rate
    }
}
