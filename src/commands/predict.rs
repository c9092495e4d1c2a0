//! `predict` command: score a single WAV file against a model.

use crate::audio::load_wav;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::features::FeatureExtractor;
use crate::net::persistence::load_model;
use crate::train::dataset::crop_to_onset;
use crate::{HOP_SIZE, NUM_MEL_FILTERS, SAMPLE_RATE, WINDOW_SIZE};

pub fn run(config: &Config) -> Result<()> {
    let pc = &config.predict;
    if pc.file.as_os_str().is_empty() {
        return Err(Error::InvalidFormat(
            "a WAV file path is required (use --file)".into(),
        ));
    }

    println!("Loading model {}...", pc.model.display());
    let mut model = load_model(&pc.model)?;

    let (samples, sample_rate) = load_wav(&pc.file)?;
    let duration = samples.len() as f64 / sample_rate as f64;

    // Normalise to the training window: one second, optionally starting
    // at the detected onset so leading silence doesn't dilute the clip.
    let normalized = if pc.onset {
        crop_to_onset(&samples, SAMPLE_RATE, SAMPLE_RATE, 0.1)
    } else {
        let mut n = samples.clone();
        n.resize(SAMPLE_RATE, 0.0);
        n
    };

    let extractor = FeatureExtractor::new(SAMPLE_RATE, WINDOW_SIZE, HOP_SIZE, NUM_MEL_FILTERS);
    let input = extractor
        .extract(&normalized)
        .ok_or_else(|| Error::InvalidFormat("clip too short for feature extraction".into()))?;

    let output = model.forward(&input)?;
    let confidence = output.data.first().copied().unwrap_or(0.0);

    let verdict = if confidence >= pc.threshold {
        "HOTWORD"
    } else {
        "NOT HOTWORD"
    };

    println!("File: {}", pc.file.display());
    println!("Metadata: {sample_rate} Hz, {duration:.2}s");
    if pc.onset {
        println!("Preprocessing: onset detection enabled");
    }
    println!("--------------------");
    println!("Confidence: {confidence:.4}");
    println!("Verdict:    {verdict} (threshold {:.2})", pc.threshold);

    Ok(())
}
