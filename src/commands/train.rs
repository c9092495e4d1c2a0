//! `train` command: load the dataset, build the configured model,
//! train it and write the model binary.

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{Config, DatasetMode};
use crate::error::{Error, Result};
use crate::features::FeatureExtractor;
use crate::net::builder::build_model;
use crate::net::persistence::save_model;
use crate::train::augment::Augmentor;
use crate::train::dataset::{
    load_dataset, load_dataset_padded, load_dataset_windowed, load_dataset_with_onset,
    load_dataset_with_onset_and_stride, Dataset,
};
use crate::train::parallel::ParallelTrainer;
use crate::train::trainer::Trainer;
use crate::{HOP_SIZE, NUM_MEL_FILTERS, SAMPLE_RATE, WINDOW_SIZE};

pub fn run(config: &Config) -> Result<()> {
    let tc = &config.train;
    let hotword_dir = tc.data.join("hotword");
    let background_dir = tc.data.join("background");
    let mut rng = StdRng::seed_from_u64(tc.seed);

    println!("Loading dataset from {}...", tc.data.display());
    let mut dataset: Dataset = match tc.mode {
        DatasetMode::Fixed => load_dataset(&hotword_dir, &background_dir, &mut rng)?,
        DatasetMode::Windowed => load_dataset_windowed(
            &hotword_dir,
            &background_dir,
            tc.window_len,
            tc.stride,
            &mut rng,
        )?,
        DatasetMode::Padded => {
            load_dataset_padded(&hotword_dir, &background_dir, tc.max_len, &mut rng)?
        }
        DatasetMode::Onset => load_dataset_with_onset(
            &hotword_dir,
            &background_dir,
            tc.window_len,
            tc.onset_threshold,
            &mut rng,
        )?,
        DatasetMode::OnsetWindowed => load_dataset_with_onset_and_stride(
            &hotword_dir,
            &background_dir,
            tc.window_len,
            tc.stride,
            tc.onset_threshold,
            &mut rng,
        )?,
    };
    dataset.shuffle(&mut rng);
    println!("Dataset: {} samples", dataset.len());

    let extractor = FeatureExtractor::new(SAMPLE_RATE, WINDOW_SIZE, HOP_SIZE, NUM_MEL_FILTERS);
    let sample_len = dataset.samples[0].audio.len();
    if extractor.frames_for_len(sample_len) == 0 {
        return Err(Error::ShapeMismatch(format!(
            "samples of {sample_len} samples are too short for a {WINDOW_SIZE}-sample window"
        )));
    }
    let input_shape = extractor.output_shape(sample_len);

    let mut model = build_model(&config.layers, &input_shape, &mut rng)?;
    info!("Model: {} layers, input shape {input_shape:?}", model.layers.len());

    let mut augmentor = if tc.augment {
        let pool: Vec<Vec<f32>> = dataset
            .samples
            .iter()
            .filter(|s| !s.is_hotword)
            .map(|s| s.audio.clone())
            .collect();
        Some(Augmentor::new(config.augment.clone(), pool, tc.seed))
    } else {
        None
    };

    let extract = |samples: &[f32]| extractor.extract(samples);

    println!(
        "Training for {} epochs (lr {}, threads {})...",
        tc.epochs, tc.learning_rate, tc.threads
    );
    if tc.threads == 1 {
        Trainer::new(tc.learning_rate).train(
            &mut model,
            &dataset,
            tc.epochs,
            augmentor.as_mut(),
            &extract,
        )?;
    } else {
        ParallelTrainer::new(tc.learning_rate, tc.threads).train(
            &mut model,
            &dataset,
            tc.epochs,
            augmentor.as_ref(),
            &extract,
        )?;
    }

    println!("Saving model to {}...", tc.out.display());
    save_model(&tc.out, &model)?;
    println!("Training complete.");
    Ok(())
}
