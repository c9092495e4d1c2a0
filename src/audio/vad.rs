//! Voice activity detection: an energy/zero-crossing gate with a
//! hangover window so speech is not chopped at pause boundaries.

use std::time::{Duration, Instant};

use crate::audio::levels::{rms, zcr};

/// Lightweight voice activity detector.
///
/// A chunk counts as speech when its RMS energy is at or above the
/// energy threshold while its ZCR stays below the ZCR threshold
/// (speech concentrates energy at low frequencies; broadband noise does
/// not). After the gate closes, `is_speech` keeps returning true for
/// `hangover_ms` so trailing syllables stay inside the active region.
#[derive(Debug)]
pub struct Vad {
    pub energy_threshold: f32,
    pub zcr_threshold: f32,
    pub hangover_ms: u64,
    last_speech: Option<Instant>,
}

impl Vad {
    pub fn new(energy_threshold: f32, zcr_threshold: f32, hangover_ms: u64) -> Self {
        Vad {
            energy_threshold,
            zcr_threshold,
            hangover_ms,
            last_speech: None,
        }
    }

    pub fn is_speech(&mut self, samples: &[f32]) -> bool {
        if samples.is_empty() {
            return false;
        }

        let currently_speech =
            rms(samples) >= self.energy_threshold && zcr(samples) < self.zcr_threshold;

        if currently_speech {
            self.last_speech = Some(Instant::now());
            return true;
        }

        match self.last_speech {
            Some(t) => t.elapsed() < Duration::from_millis(self.hangover_ms),
            None => false,
        }
    }

    pub fn reset(&mut self) {
        self.last_speech = None;
    }
}
