//! Configuration for every command, loadable from a YAML file and
//! overridable by CLI flags. The loaded value is passed explicitly into
//! the command functions; nothing is process-global.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::net::builder::LayerSpec;
use crate::train::augment::AugmentConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub train: TrainConfig,
    pub listen: ListenConfig,
    pub predict: PredictConfig,
    pub verify: VerifyConfig,
    pub augment: AugmentConfig,
    /// Model architecture; empty means the default dense classifier.
    pub layers: Vec<LayerSpec>,
}

/// How the dataset loader slices WAV files into samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DatasetMode {
    #[default]
    Fixed,
    Windowed,
    Padded,
    Onset,
    OnsetWindowed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data: PathBuf,
    pub out: PathBuf,
    pub epochs: usize,
    pub learning_rate: f32,
    pub threads: usize,
    pub seed: u64,
    pub mode: DatasetMode,
    pub window_len: usize,
    pub stride: usize,
    pub max_len: usize,
    pub onset_threshold: f32,
    pub augment: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            data: PathBuf::from("data"), // expects hotword/ and background/ inside
            out: PathBuf::from("model.bin"),
            epochs: 10,
            learning_rate: 0.01,
            threads: 1,            // >1 enables the sharded parallel trainer
            seed: 42,
            mode: DatasetMode::Fixed,
            window_len: 16000,
            stride: 8000,          // 50% overlap in windowed mode
            max_len: 32000,        // padded mode cap (2 s)
            onset_threshold: 0.1,
            augment: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub model: PathBuf,
    pub threshold: f32,
    pub cooldown_ms: u64,
    pub min_power: f32,
    pub debug: bool,
    pub vad_energy: f32,
    pub vad_zcr: f32,
    pub vad_hangover_ms: u64,
    pub action: Option<String>,
    pub script: Option<String>,
    pub save_detections: bool,
    pub save_dir: PathBuf,
}

impl Default for ListenConfig {
    fn default() -> Self {
        ListenConfig {
            model: PathBuf::from("model.bin"),
            threshold: 0.5,
            cooldown_ms: 2000,     // gate between consecutive detections
            min_power: 0.001,      // peak below this skips inference
            debug: false,
            vad_energy: 0.01,
            vad_zcr: 0.5,
            vad_hangover_ms: 300,
            action: None,
            script: None,
            save_detections: false,
            save_dir: PathBuf::from("detections"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictConfig {
    pub file: PathBuf,
    pub model: PathBuf,
    pub threshold: f32,
    pub onset: bool,
}

impl Default for PredictConfig {
    fn default() -> Self {
        PredictConfig {
            file: PathBuf::new(),
            model: PathBuf::from("model.bin"),
            threshold: 0.5,
            onset: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub model: PathBuf,
    pub data: PathBuf,
    pub threshold: f32,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        VerifyConfig {
            model: PathBuf::from("model.bin"),
            data: PathBuf::from("data"),
            threshold: 0.5,
        }
    }
}

/// Loads a YAML config file. A missing file is fine (defaults apply);
/// a malformed one is not.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = fs::read_to_string(path)?;
    serde_yaml::from_str(&text)
        .map_err(|e| Error::InvalidFormat(format!("config {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.listen.threshold, 0.5);
        assert_eq!(config.listen.cooldown_ms, 2000);
        assert_eq!(config.listen.min_power, 0.001);
        assert_eq!(config.train.epochs, 10);
        assert_eq!(config.train.learning_rate, 0.01);
        assert!(config.layers.is_empty());
    }

    #[test]
    fn partial_yaml_keeps_defaults_elsewhere() {
        let yaml = "
listen:
  threshold: 0.8
train:
  epochs: 3
layers:
  - type: dense
    units: 1
  - type: sigmoid
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.listen.threshold, 0.8);
        assert_eq!(config.listen.cooldown_ms, 2000);
        assert_eq!(config.train.epochs, 3);
        assert_eq!(config.layers.len(), 2);
        assert_eq!(config.layers[0].layer_type, "dense");
    }

    #[test]
    fn dataset_modes_parse_from_snake_case() {
        let yaml = "
train:
  mode: onset_windowed
";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.train.mode, DatasetMode::OnsetWindowed);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/config.yaml")).unwrap();
        assert_eq!(config.listen.threshold, 0.5);
    }

    #[test]
    fn malformed_file_is_invalid_format() {
        let dir = std::env::temp_dir().join(format!("hotword_cfg_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.yaml");
        fs::write(&path, "listen: [not, a, map]").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
        fs::remove_dir_all(&dir).ok();
    }
}
