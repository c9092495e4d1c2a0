//! Real-time listening loop.
//!
//! A capture thread pushes fixed-size chunks into a bounded channel; a
//! processor loop drains it and drives the engine. A full channel
//! back-pressures capture (blocking send), so chunks are processed in
//! capture order and never reordered. Both sides watch one
//! cancellation token for shutdown.

use std::io::Write;
use std::time::{Duration, Instant};

use log::{info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audio::levels::{levels, vu_bar};
use crate::audio::save_detection_wav;
use crate::capture::{run_action, run_script, AudioSource};
use crate::config::ListenConfig;
use crate::engine::Engine;
use crate::error::Result;

/// Chunks queued between capture and processing before capture blocks.
const CHANNEL_CAPACITY: usize = 10;
const VU_WIDTH: usize = 30;

/// Drives the engine from an audio source until the source ends or the
/// token is cancelled. Returns the number of detections.
pub fn run(
    mut source: Box<dyn AudioSource>,
    engine: &mut Engine,
    config: &ListenConfig,
    token: CancellationToken,
) -> Result<usize> {
    let (tx, mut rx) = mpsc::channel::<Vec<f32>>(CHANNEL_CAPACITY);

    let capture_token = token.clone();
    let capture = std::thread::spawn(move || -> Result<()> {
        loop {
            if capture_token.is_cancelled() {
                source.close();
                return Ok(());
            }
            match source.read() {
                Ok(Some(chunk)) => {
                    if tx.blocking_send(chunk).is_err() {
                        // Processor is gone; nothing left to feed.
                        source.close();
                        return Ok(());
                    }
                }
                Ok(None) => {
                    source.close();
                    return Ok(());
                }
                Err(e) => {
                    source.close();
                    return Err(e);
                }
            }
        }
    });

    let cooldown = Duration::from_millis(config.cooldown_ms);
    let mut last_detection: Option<Instant> = None;
    let mut detections = 0usize;

    while let Some(chunk) = rx.blocking_recv() {
        if token.is_cancelled() {
            break;
        }

        let (_rms, peak) = levels(&chunk);
        let bar = vu_bar(peak, VU_WIDTH);

        // Inside the cooldown window nothing is processed at all.
        if last_detection.map(|t| t.elapsed() < cooldown).unwrap_or(false) {
            print!("\rVU: {bar} [COOLDOWN] Detections: {detections}\x1b[K");
            let _ = std::io::stdout().flush();
            continue;
        }

        // Too quiet for inference: keep the ring current and move on.
        if peak < config.min_power {
            engine.push_samples(&chunk);
            print!("\rVU: {bar} [SILENT] Detections: {detections}\x1b[K");
            let _ = std::io::stdout().flush();
            continue;
        }

        let info = engine.process_debug(&chunk, config.threshold);

        if config.debug {
            println!(
                "[DEBUG] peak={peak:.4} raw={:.4} smooth={:.4} consec={} vad={} detected={}",
                info.raw_prob, info.smooth_prob, info.consecutive_high, info.vad_active, info.detected
            );
        } else {
            let status = if info.vad_active { "" } else { " [VAD: INACTIVE]" };
            print!(
                "\rVU: {bar} Confidence: {:.4}{status} | Detections: {detections}\x1b[K",
                info.smooth_prob
            );
            let _ = std::io::stdout().flush();
        }

        if info.detected {
            detections += 1;
            last_detection = Some(Instant::now());
            println!("\n*** HOTWORD DETECTED! (Confidence: {:.4}) ***", info.smooth_prob);

            if config.save_detections {
                let snapshot = engine.ring_snapshot();
                if let Err(e) = save_detection_wav(&config.save_dir, &snapshot, info.smooth_prob) {
                    warn!("Couldn't save detection: {e}");
                }
            }

            // Residual probability must not leak into the next
            // detection window.
            engine.reset();

            if let Some(action) = &config.action {
                run_action(action);
            }
            if let Some(script) = &config.script {
                run_script(script);
            }
        }
    }

    drop(rx);
    match capture.join() {
        Ok(result) => {
            if token.is_cancelled() {
                info!("Listener stopped");
                Ok(detections)
            } else {
                result.map(|_| detections)
            }
        }
        Err(_) => {
            warn!("Capture thread panicked");
            Ok(detections)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::vad::Vad;
    use crate::capture::BufferSource;
    use crate::net::layer::Layer;
    use crate::net::tensor::Tensor;
    use crate::net::Sequential;
    use crate::{HOP_SIZE, NUM_MEL_FILTERS, SAMPLE_RATE, WINDOW_SIZE};

    fn constant_model(prob: f32) -> Sequential {
        let frames = (SAMPLE_RATE - WINDOW_SIZE) / HOP_SIZE + 1;
        let in_size = frames * NUM_MEL_FILTERS;
        let logit = (prob / (1.0 - prob)).ln();
        Sequential::new(vec![
            Layer::dense(Tensor::new(&[1, in_size]), vec![logit]),
            Layer::Sigmoid,
        ])
    }

    fn engine(prob: f32) -> Engine {
        Engine::new(constant_model(prob), Vad::new(0.01, 0.5, 300))
    }

    /// Enough audible chunks for warm-up plus one detection streak.
    fn detection_stream(repeats: usize) -> Vec<Vec<f32>> {
        let mut chunks = Vec::new();
        for _ in 0..repeats {
            for _ in 0..21 {
                chunks.push(vec![0.05f32; 1000]);
            }
        }
        chunks
    }

    #[test]
    fn detects_once_per_stream() {
        let mut engine = engine(0.99);
        let config = ListenConfig {
            cooldown_ms: 0,
            ..ListenConfig::default()
        };
        let source = Box::new(BufferSource::new(detection_stream(1)));
        let count = run(source, &mut engine, &config, CancellationToken::new()).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn cooldown_gates_the_second_detection() {
        // Two back-to-back detection streaks. With the 2 s cooldown the
        // second one falls inside the gate and must not fire; with the
        // gate removed it does.
        let config = ListenConfig::default();
        assert_eq!(config.cooldown_ms, 2000);

        let mut gated = engine(0.99);
        let source = Box::new(BufferSource::new(detection_stream(2)));
        let count = run(source, &mut gated, &config, CancellationToken::new()).unwrap();
        assert_eq!(count, 1);

        let ungated_config = ListenConfig {
            cooldown_ms: 0,
            ..ListenConfig::default()
        };
        let mut ungated = engine(0.99);
        let source = Box::new(BufferSource::new(detection_stream(2)));
        let count = run(source, &mut ungated, &ungated_config, CancellationToken::new()).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn silent_chunks_never_reach_inference() {
        let mut eng = engine(0.99);
        // Peak 0.0005 is under the default min_power of 0.001: the
        // chunks only slide the ring, so no detection can happen even
        // with a model that always says yes.
        let chunks = vec![vec![0.0005f32; 1000]; 40];
        let source = Box::new(BufferSource::new(chunks));
        let count = run(source, &mut eng, &ListenConfig::default(), CancellationToken::new()).unwrap();
        assert_eq!(count, 0);
        assert_eq!(eng.smooth_prob(), 0.0);
    }

    #[test]
    fn cancelled_token_stops_the_loop() {
        let mut eng = engine(0.99);
        let token = CancellationToken::new();
        token.cancel();
        let source = Box::new(BufferSource::new(detection_stream(1)));
        let count = run(source, &mut eng, &ListenConfig::default(), token).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn quiet_model_never_detects() {
        let mut eng = engine(0.2);
        let source = Box::new(BufferSource::new(detection_stream(1)));
        let count = run(source, &mut eng, &ListenConfig::default(), CancellationToken::new()).unwrap();
        assert_eq!(count, 0);
    }
}
