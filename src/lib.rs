//! Hotword detection toolkit: trains a compact neural classifier on
//! short WAV clips and runs it in real time over a microphone stream.

pub mod audio;
pub mod capture;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod listener;
pub mod net;
pub mod train;


pub use error::{Error, Result};

/// The engine runs at a fixed 16 kHz; WAV files at other rates are
/// recorded as-is but the pipeline assumes this rate.
pub const SAMPLE_RATE: usize = 16000;

/// STFT window, in samples. Must be a power of two for the FFT.
pub const WINDOW_SIZE: usize = 512;

/// STFT hop, in samples.
pub const HOP_SIZE: usize = 256;

/// Triangular filters in the Mel bank.
pub const NUM_MEL_FILTERS: usize = 40;
