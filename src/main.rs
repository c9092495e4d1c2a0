use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hotword::commands;
use hotword::config::{load_config, Config, DatasetMode};
use hotword::Error;

#[derive(Parser)]
#[command(name = "hotword")]
#[command(about = "Train a hotword classifier on WAV clips and spot it in a live mic stream")]
struct Cli {
    /// Path to the YAML config file; missing file means defaults.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a model from hotword/ and background/ WAV directories
    Train {
        /// Directory containing hotword/ and background/ subdirectories
        #[arg(long)]
        data: Option<PathBuf>,
        /// Where to write the trained model
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long)]
        epochs: Option<usize>,
        /// Learning rate
        #[arg(long)]
        lr: Option<f32>,
        /// Worker threads; 1 trains sequentially, 0 uses all cores
        #[arg(long)]
        threads: Option<usize>,
        /// Dataset mode: fixed, windowed, padded, onset, onset_windowed
        #[arg(long)]
        mode: Option<String>,
        /// Augment positive samples during training
        #[arg(long)]
        augment: bool,
        /// RNG seed for init, shuffling and augmentation
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Score a single WAV file against a trained model
    Predict {
        /// WAV file to test
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        threshold: Option<f32>,
        /// Crop the clip to its detected onset first
        #[arg(long)]
        onset: bool,
    },
    /// Verify a model against a labelled dataset
    Verify {
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        data: Option<PathBuf>,
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Print the layer table of a trained model
    Inspect {
        /// Model file to inspect
        #[arg(long, default_value = "model.bin")]
        model: PathBuf,
    },
    /// Listen on the microphone and trigger actions on detection
    Listen {
        #[arg(long)]
        model: Option<PathBuf>,
        #[arg(long)]
        threshold: Option<f32>,
        /// Shell command to run on detection
        #[arg(long)]
        action: Option<String>,
        /// Script to run on detection
        #[arg(long)]
        script: Option<String>,
        /// Cooldown between detections, in milliseconds
        #[arg(long)]
        cooldown: Option<u64>,
        /// Minimum peak amplitude before inference runs
        #[arg(long)]
        min_power: Option<f32>,
        /// Print raw engine state for every chunk
        #[arg(long)]
        debug: bool,
        /// Save the ring buffer to a WAV on every detection
        #[arg(long)]
        save_detections: bool,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = dispatch(cli.command, config);
    match result {
        Ok(()) | Err(Error::Canceled) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Command, mut config: Config) -> hotword::Result<()> {
    match command {
        Command::Train {
            data,
            out,
            epochs,
            lr,
            threads,
            mode,
            augment,
            seed,
        } => {
            if let Some(v) = data {
                config.train.data = v;
            }
            if let Some(v) = out {
                config.train.out = v;
            }
            if let Some(v) = epochs {
                config.train.epochs = v;
            }
            if let Some(v) = lr {
                config.train.learning_rate = v;
            }
            if let Some(v) = threads {
                config.train.threads = v;
            }
            if let Some(v) = mode {
                config.train.mode = parse_mode(&v)?;
            }
            if let Some(v) = seed {
                config.train.seed = v;
            }
            if augment {
                config.train.augment = true;
            }
            commands::train::run(&config)
        }
        Command::Predict {
            file,
            model,
            threshold,
            onset,
        } => {
            if let Some(v) = file {
                config.predict.file = v;
            }
            if let Some(v) = model {
                config.predict.model = v;
            }
            if let Some(v) = threshold {
                config.predict.threshold = v;
            }
            if onset {
                config.predict.onset = true;
            }
            commands::predict::run(&config)
        }
        Command::Verify {
            model,
            data,
            threshold,
        } => {
            if let Some(v) = model {
                config.verify.model = v;
            }
            if let Some(v) = data {
                config.verify.data = v;
            }
            if let Some(v) = threshold {
                config.verify.threshold = v;
            }
            commands::verify::run(&config)
        }
        Command::Inspect { model } => commands::inspect::run(&model),
        Command::Listen {
            model,
            threshold,
            action,
            script,
            cooldown,
            min_power,
            debug,
            save_detections,
        } => {
            if let Some(v) = model {
                config.listen.model = v;
            }
            if let Some(v) = threshold {
                config.listen.threshold = v;
            }
            if action.is_some() {
                config.listen.action = action;
            }
            if script.is_some() {
                config.listen.script = script;
            }
            if let Some(v) = cooldown {
                config.listen.cooldown_ms = v;
            }
            if let Some(v) = min_power {
                config.listen.min_power = v;
            }
            if debug {
                config.listen.debug = true;
            }
            if save_detections {
                config.listen.save_detections = true;
            }
            commands::listen::run(&config)
        }
    }
}

fn parse_mode(s: &str) -> hotword::Result<DatasetMode> {
    match s {
        "fixed" => Ok(DatasetMode::Fixed),
        "windowed" => Ok(DatasetMode::Windowed),
        "padded" => Ok(DatasetMode::Padded),
        "onset" => Ok(DatasetMode::Onset),
        "onset_windowed" => Ok(DatasetMode::OnsetWindowed),
        other => Err(Error::InvalidFormat(format!("unknown dataset mode: {other}"))),
    }
}
