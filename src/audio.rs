use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::Utc;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::debug;

use crate::error::{Error, Result};
use crate::SAMPLE_RATE;

pub mod dsp;
pub mod levels;
pub mod mel;
pub mod vad;
pub mod window;

/// Loads a 16-bit PCM WAV file as mono f32 samples in [-1, 1].
///
/// Multi-channel audio is mixed down by averaging the channels. The
/// file's sample rate is returned alongside the samples; the engine
/// assumes 16 kHz but the decoder records whatever the file declares.
pub fn load_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let file = fs::File::open(path)?;
    load_wav_reader(BufReader::new(file))
}

/// Same as [`load_wav`] but over any reader, so tests and in-memory
/// buffers go through the identical decode path.
pub fn load_wav_reader<R: Read>(reader: R) -> Result<(Vec<f32>, u32)> {
    let mut wav = WavReader::new(reader)?;
    let spec = wav.spec();

    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(Error::InvalidFormat(format!(
            "only 16-bit PCM WAV is supported (got {:?} {} bit)",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let channels = spec.channels as usize;
    let mut samples = Vec::with_capacity(wav.len() as usize / channels.max(1));
    let mut frame_sum = 0.0f32;
    let mut in_frame = 0usize;

    for s in wav.samples::<i16>() {
        frame_sum += s? as f32 / 32768.0;
        in_frame += 1;
        if in_frame == channels {
            samples.push(frame_sum / channels as f32);
            frame_sum = 0.0;
            in_frame = 0;
        }
    }

    Ok((samples, spec.sample_rate))
}

/// Writes mono f32 samples as a 16-bit PCM WAV file.
pub fn save_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for s in samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * 32767.0) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Saves a detection snapshot under `dir` with a timestamped name and
/// returns the file path.
pub fn save_detection_wav(dir: &Path, samples: &[f32], confidence: f32) -> Result<String> {
    fs::create_dir_all(dir)?;
    let ts = Utc::now().format("%y%m%d-%H%M%S").to_string();
    let pct = (confidence * 100.0) as u32;
    let path = dir.join(format!("detection_{pct}_{ts}.wav"));
    save_wav(&path, samples, SAMPLE_RATE as u32)?;
    let filename = path.to_string_lossy().into_owned();
    debug!("Detection saved to {filename}");
    Ok(filename)
}
