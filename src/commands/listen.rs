//! `listen` command: run the streaming engine against the microphone
//! until Ctrl-C.

use tokio_util::sync::CancellationToken;

use crate::audio::vad::Vad;
use crate::capture::MicSource;
use crate::config::Config;
use crate::engine::Engine;
use crate::error::Result;
use crate::listener;
use crate::net::persistence::load_model;

pub fn run(config: &Config) -> Result<()> {
    let lc = &config.listen;

    println!("Loading model from {}...", lc.model.display());
    let model = load_model(&lc.model)?;

    let vad = Vad::new(lc.vad_energy, lc.vad_zcr, lc.vad_hangover_ms);
    let mut engine = Engine::new(model, vad);

    let source = Box::new(MicSource::open()?);
    let token = CancellationToken::new();

    // Ctrl-C cancels the shared token; capture and processor both
    // observe it and wind down.
    let signal_token = token.clone();
    std::thread::spawn(move || {
        if let Ok(rt) = tokio::runtime::Builder::new_current_thread().enable_all().build() {
            let _ = rt.block_on(tokio::signal::ctrl_c());
            signal_token.cancel();
        }
    });

    println!(
        "Listening for hotword (threshold {:.2}, min power {:.4}, cooldown {} ms)...",
        lc.threshold, lc.min_power, lc.cooldown_ms
    );
    println!(
        "VAD gate: energy >= {:.4} and ZCR < {:.4} (hangover {} ms)",
        lc.vad_energy, lc.vad_zcr, lc.vad_hangover_ms
    );
    println!("Press Ctrl+C to stop.");

    let detections = listener::run(source, &mut engine, lc, token)?;
    println!("\nStopped after {detections} detection(s).");
    Ok(())
}
