//! `verify` command: sweep a labelled dataset through a trained model
//! and report accuracy with a confusion matrix.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::Config;
use crate::error::Result;
use crate::features::FeatureExtractor;
use crate::net::persistence::load_model;
use crate::train::dataset::load_dataset;
use crate::{HOP_SIZE, NUM_MEL_FILTERS, SAMPLE_RATE, WINDOW_SIZE};

pub fn run(config: &Config) -> Result<()> {
    let vc = &config.verify;

    println!("Loading model from {}...", vc.model.display());
    let mut model = load_model(&vc.model)?;

    println!("Loading verification dataset from {}...", vc.data.display());
    let hotword_dir = vc.data.join("hotword");
    let background_dir = vc.data.join("background");
    let mut rng = StdRng::seed_from_u64(0);
    let dataset = load_dataset(&hotword_dir, &background_dir, &mut rng)?;

    let extractor = FeatureExtractor::new(SAMPLE_RATE, WINDOW_SIZE, HOP_SIZE, NUM_MEL_FILTERS);

    let (mut tp, mut tn, mut fp, mut fn_) = (0usize, 0usize, 0usize, 0usize);
    let mut failed: Vec<String> = Vec::new();

    println!("Verifying {} samples...", dataset.len());
    for (i, sample) in dataset.samples.iter().enumerate() {
        let detected = match extractor.extract(&sample.audio) {
            Some(input) => model.forward(&input)?.data[0] >= vc.threshold,
            None => false,
        };

        match (sample.is_hotword, detected) {
            (true, true) => tp += 1,
            (true, false) => {
                fn_ += 1;
                failed.push(format!("Sample {i} (hotword) missed"));
            }
            (false, true) => {
                fp += 1;
                failed.push(format!("Sample {i} (background) triggered"));
            }
            (false, false) => tn += 1,
        }
    }

    let total = dataset.len();
    let accuracy = (tp + tn) as f32 / total as f32 * 100.0;

    println!();
    println!("Verification results:");
    println!("--------------------");
    println!("Accuracy: {accuracy:.2}% ({}/{total})", tp + tn);
    println!("Confusion matrix:");
    println!("  TP: {tp} | FN: {fn_}");
    println!("  FP: {fp} | TN: {tn}");

    if !failed.is_empty() {
        println!();
        println!("Failed samples:");
        for msg in &failed {
            println!("  - {msg}");
        }
    }

    Ok(())
}
