//! Loads labelled WAV clips from disk and pads the set with synthetic
//! negatives.
//!
//! All loaders take a hotword directory and a background directory;
//! the directory decides the label. A corrupt file is logged and
//! skipped, never fatal. After loading, max(100, |positives|)
//! synthetic noise samples are appended; the onset-shaped ones are what
//! teach the model to stay quiet when the power gate first opens on
//! real audio.

use std::path::{Path, PathBuf};

use log::warn;
use rand::Rng;
use rayon::prelude::*;

use crate::audio::levels::rms;
use crate::audio::load_wav;
use crate::error::{Error, Result};
use crate::train::progress::ProgressBar;
use crate::SAMPLE_RATE;

/// One training clip.
#[derive(Debug, Clone)]
pub struct Sample {
    pub audio: Vec<f32>,
    pub is_hotword: bool,
    /// Length before zero padding, for variable-length masking.
    pub actual_len: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub samples: Vec<Sample>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        use rand::seq::SliceRandom;
        self.samples.shuffle(rng);
    }
}

/// Loads clips normalised to a fixed one-second length.
pub fn load_dataset<R: Rng>(hotword_dir: &Path, background_dir: &Path, rng: &mut R) -> Result<Dataset> {
    let target_len = SAMPLE_RATE;
    let pb = ProgressBar::new(0, "Loading dataset");

    let hot = load_from_dir(hotword_dir, true, &pb, |audio| {
        vec![fixed_length_sample(audio, true, target_len)]
    })?;
    let bg = load_from_dir(background_dir, false, &pb, |audio| {
        vec![fixed_length_sample(audio, false, target_len)]
    })?;
    pb.finish();

    assemble(hot, bg, target_len, rng)
}

/// Loads clips as overlapping windows of `window_len` samples spaced
/// `stride` apart, so long recordings contribute multiple samples.
pub fn load_dataset_windowed<R: Rng>(
    hotword_dir: &Path,
    background_dir: &Path,
    window_len: usize,
    stride: usize,
    rng: &mut R,
) -> Result<Dataset> {
    let pb = ProgressBar::new(0, "Loading dataset (windowed)");

    let hot = load_from_dir(hotword_dir, true, &pb, |audio| {
        windowed_samples(audio, true, window_len, stride)
    })?;
    let bg = load_from_dir(background_dir, false, &pb, |audio| {
        windowed_samples(audio, false, window_len, stride)
    })?;
    pb.finish();

    assemble(hot, bg, window_len, rng)
}

/// Loads variable-length clips zero-padded to `max_len`, recording the
/// pre-pad length for masked recurrent training.
pub fn load_dataset_padded<R: Rng>(
    hotword_dir: &Path,
    background_dir: &Path,
    max_len: usize,
    rng: &mut R,
) -> Result<Dataset> {
    let pb = ProgressBar::new(0, "Loading dataset (padded)");

    let hot = load_from_dir(hotword_dir, true, &pb, |audio| {
        vec![fixed_length_sample(audio, true, max_len)]
    })?;
    let bg = load_from_dir(background_dir, false, &pb, |audio| {
        vec![fixed_length_sample(audio, false, max_len)]
    })?;
    pb.finish();

    assemble(hot, bg, max_len, rng)
}

/// Loads clips cropped to start at the detected audio onset.
pub fn load_dataset_with_onset<R: Rng>(
    hotword_dir: &Path,
    background_dir: &Path,
    target_len: usize,
    threshold: f32,
    rng: &mut R,
) -> Result<Dataset> {
    let pb = ProgressBar::new(0, "Loading dataset (onset)");

    let crop = move |audio: Vec<f32>, is_hotword: bool| {
        let cropped = crop_to_onset(&audio, SAMPLE_RATE, target_len, threshold);
        vec![Sample {
            actual_len: cropped.len(),
            audio: cropped,
            is_hotword,
        }]
    };
    let hot = load_from_dir(hotword_dir, true, &pb, move |a| crop(a, true))?;
    let bg = load_from_dir(background_dir, false, &pb, move |a| crop(a, false))?;
    pb.finish();

    assemble(hot, bg, target_len, rng)
}

/// Onset detection followed by window extraction: crops the silent
/// lead-in, then slices the rest into overlapping windows.
pub fn load_dataset_with_onset_and_stride<R: Rng>(
    hotword_dir: &Path,
    background_dir: &Path,
    window_len: usize,
    stride: usize,
    threshold: f32,
    rng: &mut R,
) -> Result<Dataset> {
    let pb = ProgressBar::new(0, "Loading dataset (onset+stride)");

    let crop = move |audio: Vec<f32>, is_hotword: bool| {
        let lead = SAMPLE_RATE / 20;
        let onset = find_onset(&audio, SAMPLE_RATE, threshold, lead);
        windowed_samples(audio[onset..].to_vec(), is_hotword, window_len, stride)
    };
    let hot = load_from_dir(hotword_dir, true, &pb, move |a| crop(a, true))?;
    let bg = load_from_dir(background_dir, false, &pb, move |a| crop(a, false))?;
    pb.finish();

    assemble(hot, bg, window_len, rng)
}

fn assemble<R: Rng>(
    hot: Vec<Sample>,
    bg: Vec<Sample>,
    noise_len: usize,
    rng: &mut R,
) -> Result<Dataset> {
    if hot.is_empty() && bg.is_empty() {
        return Err(Error::EmptyDataset);
    }

    let noise_count = hot.len().max(100);
    let mut samples = hot;
    samples.extend(bg);
    samples.extend(generate_noise_samples(noise_count, noise_len, rng));

    Ok(Dataset { samples })
}

fn fixed_length_sample(audio: Vec<f32>, is_hotword: bool, target_len: usize) -> Sample {
    let actual_len = audio.len().min(target_len);
    let mut normalized = audio;
    normalized.resize(target_len, 0.0);
    Sample {
        audio: normalized,
        is_hotword,
        actual_len,
    }
}

fn windowed_samples(audio: Vec<f32>, is_hotword: bool, window_len: usize, stride: usize) -> Vec<Sample> {
    extract_windows(&audio, window_len, stride)
        .into_iter()
        .map(|window| Sample {
            actual_len: window.len(),
            audio: window,
            is_hotword,
        })
        .collect()
}

/// Scans a directory for `.wav` files and decodes them in parallel.
/// Files that fail to decode are logged and dropped.
fn load_from_dir<F>(dir: &Path, is_hotword: bool, pb: &ProgressBar, per_file: F) -> Result<Vec<Sample>>
where
    F: Fn(Vec<f32>) -> Vec<Sample> + Sync,
{
    let mut wav_files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|e| e == "wav").unwrap_or(false))
        .collect();
    wav_files.sort();

    pb.add_total(wav_files.len());
    let label = if is_hotword { "hotword" } else { "background" };

    let samples: Vec<Sample> = wav_files
        .par_iter()
        .filter_map(|path| {
            let result = match load_wav(path) {
                Ok((audio, _rate)) => Some(per_file(audio)),
                Err(e) => {
                    warn!("Skipping {label} file {}: {e}", path.display());
                    None
                }
            };
            pb.inc();
            result
        })
        .flatten()
        .collect();

    Ok(samples)
}

/// Extracts overlapping windows. Audio shorter than the window yields
/// one zero-padded window; a leftover tail shorter than a stride still
/// contributes a final window anchored at the end.
pub fn extract_windows(audio: &[f32], window_len: usize, stride: usize) -> Vec<Vec<f32>> {
    if audio.is_empty() {
        return Vec::new();
    }

    if audio.len() <= window_len {
        let mut window = audio.to_vec();
        window.resize(window_len, 0.0);
        return vec![window];
    }

    let mut windows = Vec::new();
    let mut start = 0;
    while start + window_len <= audio.len() {
        windows.push(audio[start..start + window_len].to_vec());
        start += stride;
    }

    let last_start = audio.len() - window_len;
    let prev_start = (windows.len() - 1) * stride;
    if last_start > prev_start {
        windows.push(audio[last_start..].to_vec());
    }

    windows
}

/// Finds the first sample index where audio activity begins, scanning
/// 10 ms RMS windows at half-window steps. The threshold is relative to
/// the loudest window in the file; files whose peak energy never rises
/// above the absolute 0.001 floor report onset 0. `lead_samples` backs
/// the result off so the attack transient is kept.
pub fn find_onset(audio: &[f32], sample_rate: usize, threshold: f32, lead_samples: usize) -> usize {
    if audio.is_empty() {
        return 0;
    }

    let window_size = (sample_rate / 100).max(16);
    let step = window_size / 2;

    let mut max_energy = 0.0f32;
    let mut i = 0;
    while i + window_size <= audio.len() {
        max_energy = max_energy.max(rms(&audio[i..i + window_size]));
        i += step;
    }

    if max_energy < 0.001 {
        return 0;
    }

    let energy_threshold = threshold * max_energy;
    let mut i = 0;
    while i + window_size <= audio.len() {
        if rms(&audio[i..i + window_size]) >= energy_threshold {
            return i.saturating_sub(lead_samples);
        }
        i += step;
    }

    0
}

/// Crops `target_len` samples starting at the detected onset (with a
/// 50 ms lead-in), zero-padding when the clip runs out early.
pub fn crop_to_onset(audio: &[f32], sample_rate: usize, target_len: usize, threshold: f32) -> Vec<f32> {
    let lead_samples = sample_rate / 20;
    let onset = find_onset(audio, sample_rate, threshold, lead_samples);

    let mut cropped = vec![0.0f32; target_len];
    let available = (audio.len() - onset).min(target_len);
    cropped[..available].copy_from_slice(&audio[onset..onset + available]);
    cropped
}

/// Synthetic negatives cycled over eight deterministic types: white
/// noise at two amplitudes, spiky near-silence, pure silence, three
/// onset patterns (half, fade-in, 75%) and a low continuous hiss. The
/// onset patterns are what reject the transient when the listener's
/// power gate opens.
pub fn generate_noise_samples<R: Rng>(count: usize, length: usize, rng: &mut R) -> Vec<Sample> {
    let mut samples = Vec::with_capacity(count);

    for n in 0..count {
        let mut audio = vec![0.0f32; length];
        match n % 8 {
            0 => {
                for v in &mut audio {
                    *v = (rng.gen::<f32>() * 2.0 - 1.0) * 0.5;
                }
            }
            1 => {
                for v in &mut audio {
                    *v = (rng.gen::<f32>() * 2.0 - 1.0) * 0.1;
                }
            }
            2 => {
                for v in &mut audio {
                    *v = if rng.gen::<f32>() < 0.01 {
                        (rng.gen::<f32>() * 2.0 - 1.0) * 0.3
                    } else {
                        (rng.gen::<f32>() * 2.0 - 1.0) * 0.01
                    };
                }
            }
            3 => {} // pure silence
            4 => {
                for v in &mut audio[length / 2..] {
                    *v = (rng.gen::<f32>() * 2.0 - 1.0) * 0.5;
                }
            }
            5 => {
                for (j, v) in audio.iter_mut().enumerate() {
                    let fade_in = j as f32 / length as f32;
                    *v = (rng.gen::<f32>() * 2.0 - 1.0) * 0.5 * fade_in;
                }
            }
            6 => {
                for v in &mut audio[length * 3 / 4..] {
                    *v = (rng.gen::<f32>() * 2.0 - 1.0) * 0.5;
                }
            }
            _ => {
                for v in &mut audio {
                    *v = (rng.gen::<f32>() * 2.0 - 1.0) * 0.02;
                }
            }
        }

        samples.push(Sample {
            actual_len: audio.len(),
            audio,
            is_hotword: false,
        });
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::save_wav;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;

    fn temp_dataset_dirs(tag: &str) -> (PathBuf, PathBuf) {
        let base = std::env::temp_dir().join(format!("hotword_ds_{tag}_{}", std::process::id()));
        let hot = base.join("hotword");
        let bg = base.join("background");
        fs::create_dir_all(&hot).unwrap();
        fs::create_dir_all(&bg).unwrap();
        (hot, bg)
    }

    fn tone(len: usize, amp: f32) -> Vec<f32> {
        (0..len).map(|i| ((i as f32) * 0.2).sin() * amp).collect()
    }

    #[test]
    fn fixed_mode_pads_and_records_actual_len() {
        let (hot, bg) = temp_dataset_dirs("fixed");
        save_wav(&hot.join("a.wav"), &tone(8000, 0.5), 16000).unwrap();
        save_wav(&bg.join("b.wav"), &tone(20000, 0.2), 16000).unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let ds = load_dataset(&hot, &bg, &mut rng).unwrap();

        let positives: Vec<&Sample> = ds.samples.iter().filter(|s| s.is_hotword).collect();
        assert_eq!(positives.len(), 1);
        assert_eq!(positives[0].audio.len(), 16000);
        assert_eq!(positives[0].actual_len, 8000);
        // Truncated background keeps the full window as actual length.
        let negatives_real: Vec<&Sample> = ds
            .samples
            .iter()
            .filter(|s| !s.is_hotword && s.actual_len == 16000)
            .collect();
        assert!(!negatives_real.is_empty());

        fs::remove_dir_all(hot.parent().unwrap()).ok();
    }

    #[test]
    fn synthetic_negatives_meet_the_floor() {
        let (hot, bg) = temp_dataset_dirs("noise");
        save_wav(&hot.join("a.wav"), &tone(16000, 0.5), 16000).unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let ds = load_dataset(&hot, &bg, &mut rng).unwrap();

        let negatives = ds.samples.iter().filter(|s| !s.is_hotword).count();
        // 1 positive -> floor of 100 synthetic negatives.
        assert!(negatives >= 100);

        fs::remove_dir_all(hot.parent().unwrap()).ok();
    }

    #[test]
    fn empty_directories_are_an_empty_dataset() {
        let (hot, bg) = temp_dataset_dirs("empty");
        let mut rng = StdRng::seed_from_u64(5);
        let err = load_dataset(&hot, &bg, &mut rng).unwrap_err();
        assert!(matches!(err, Error::EmptyDataset));
        fs::remove_dir_all(hot.parent().unwrap()).ok();
    }

    #[test]
    fn corrupt_wav_is_skipped_not_fatal() {
        let (hot, bg) = temp_dataset_dirs("corrupt");
        save_wav(&hot.join("good.wav"), &tone(16000, 0.5), 16000).unwrap();
        fs::write(hot.join("bad.wav"), b"not a wav at all").unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let ds = load_dataset(&hot, &bg, &mut rng).unwrap();
        assert_eq!(ds.samples.iter().filter(|s| s.is_hotword).count(), 1);

        fs::remove_dir_all(hot.parent().unwrap()).ok();
    }

    #[test]
    fn extract_windows_counts() {
        let audio = vec![0.1f32; 100];
        let windows = extract_windows(&audio, 40, 20);
        // Starts at 0, 20, 40, 60 -> four full windows; no tail window
        // because the last one already ends at the end.
        assert_eq!(windows.len(), 4);
        assert!(windows.iter().all(|w| w.len() == 40));

        // A trailing remainder produces one extra end-anchored window.
        let audio = vec![0.1f32; 110];
        let windows = extract_windows(&audio, 40, 20);
        assert_eq!(windows.len(), 5);
    }

    #[test]
    fn extract_windows_pads_short_audio() {
        let audio = vec![0.5f32; 10];
        let windows = extract_windows(&audio, 40, 20);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].len(), 40);
        assert_eq!(&windows[0][..10], &audio[..]);
        assert!(windows[0][10..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn onset_is_found_after_silence() {
        // 0.5 s of silence, then a loud tone.
        let mut audio = vec![0.0f32; 8000];
        audio.extend(tone(8000, 0.5));

        let onset = find_onset(&audio, 16000, 0.1, 0);
        assert!(onset >= 7800 && onset <= 8200, "onset {onset}");

        // Lead time backs the onset off.
        let with_lead = find_onset(&audio, 16000, 0.1, 800);
        assert!(with_lead < onset);
    }

    #[test]
    fn silent_file_reports_onset_zero() {
        let audio = vec![0.0005f32; 16000];
        assert_eq!(find_onset(&audio, 16000, 0.1, 0), 0);
        assert_eq!(find_onset(&[], 16000, 0.1, 0), 0);
    }

    #[test]
    fn crop_to_onset_pads_when_audio_runs_out() {
        let mut audio = vec![0.0f32; 8000];
        audio.extend(tone(4000, 0.5));

        let cropped = crop_to_onset(&audio, 16000, 16000, 0.1);
        assert_eq!(cropped.len(), 16000);
        // The tail past the available audio is zero padding.
        assert!(cropped[8000..].iter().all(|&v| v == 0.0));
        // The head holds the cropped signal.
        assert!(cropped[1000..3000].iter().any(|&v| v.abs() > 0.1));
    }

    #[test]
    fn noise_types_cycle_deterministically() {
        let mut rng = StdRng::seed_from_u64(11);
        let samples = generate_noise_samples(16, 1000, &mut rng);
        assert_eq!(samples.len(), 16);
        assert!(samples.iter().all(|s| !s.is_hotword && s.audio.len() == 1000));

        // Type 3 (index 3 and 11) is pure silence.
        assert!(samples[3].audio.iter().all(|&v| v == 0.0));
        assert!(samples[11].audio.iter().all(|&v| v == 0.0));
        // Type 4 is silent in the first half, noisy in the second.
        assert!(samples[4].audio[..500].iter().all(|&v| v == 0.0));
        assert!(samples[4].audio[500..].iter().any(|&v| v.abs() > 0.01));
        // Type 6 is silent for the first three quarters.
        assert!(samples[6].audio[..750].iter().all(|&v| v == 0.0));
    }
}
