//! Audio input: the `AudioSource` contract the engine consumes, the
//! cpal-backed microphone implementation, and the detached action
//! runner invoked on detections.

use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use log::{debug, warn};

use crate::audio::window::SlidingWindow;
use crate::error::{Error, Result};
use crate::SAMPLE_RATE;

/// Samples per chunk delivered to the listener.
pub const CHUNK_SIZE: usize = 512;

/// A stream of f32 sample chunks. `read` returns `Ok(None)` at end of
/// stream; any other failure is a device error.
pub trait AudioSource: Send {
    fn read(&mut self) -> Result<Option<Vec<f32>>>;
    fn close(&mut self);
}

/// Microphone capture through cpal.
///
/// The cpal stream handle is not `Send`, so it lives on a dedicated
/// device thread for its whole life; the callback side accumulates
/// samples and forwards fixed-size chunks over a channel that `read`
/// blocks on.
pub struct MicSource {
    receiver: Receiver<Vec<f32>>,
    stop: Arc<AtomicBool>,
    device_thread: Option<JoinHandle<()>>,
}

impl MicSource {
    pub fn open() -> Result<Self> {
        let (chunk_tx, chunk_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = stop.clone();
        let device_thread = thread::spawn(move || {
            let stream = match open_stream(chunk_tx) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };

            while !thread_stop.load(Ordering::Relaxed) {
                thread::sleep(Duration::from_millis(100));
            }
            drop(stream);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(MicSource {
                receiver: chunk_rx,
                stop,
                device_thread: Some(device_thread),
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::DeviceError("capture thread died during open".into())),
        }
    }
}

fn open_stream(sender: Sender<Vec<f32>>) -> Result<Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| Error::DeviceError("no input device available".into()))?;
    match device.name() {
        Ok(name) => debug!("Input device: {name}"),
        Err(e) => warn!("Couldn't read mic name: {e}"),
    }

    let config = StreamConfig {
        channels: 1,
        sample_rate: SampleRate(SAMPLE_RATE as u32),
        buffer_size: cpal::BufferSize::Default,
    };

    // The device delivers whatever buffer sizes it likes; regroup into
    // fixed chunks before they cross the channel.
    let mut window = SlidingWindow::new(CHUNK_SIZE, CHUNK_SIZE);
    let err_fn = |err| warn!("Input stream error: {err}");

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                window.add_samples(data);
                while let Some(chunk) = window.next_window() {
                    let _ = sender.send(chunk);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| Error::DeviceError(e.to_string()))?;

    stream.play().map_err(|e| Error::DeviceError(e.to_string()))?;
    Ok(stream)
}

impl AudioSource for MicSource {
    fn read(&mut self) -> Result<Option<Vec<f32>>> {
        match self.receiver.recv() {
            Ok(chunk) => Ok(Some(chunk)),
            Err(_) => {
                if self.stop.load(Ordering::Relaxed) {
                    Ok(None)
                } else {
                    Err(Error::DeviceError("capture stream ended unexpectedly".into()))
                }
            }
        }
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.device_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MicSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Spawns a shell command detached; the caller never waits on it.
pub fn run_action(action: &str) {
    match Command::new("sh").arg("-c").arg(action).spawn() {
        Ok(child) => debug!("Spawned action pid {}", child.id()),
        Err(e) => warn!("Failed to run action '{action}': {e}"),
    }
}

/// Runs a script file detached.
pub fn run_script(path: &str) {
    match Command::new(path).spawn() {
        Ok(child) => debug!("Spawned script pid {}", child.id()),
        Err(e) => warn!("Failed to run script '{path}': {e}"),
    }
}

/// Replays a fixed set of chunks; the test double for `MicSource`.
pub struct BufferSource {
    chunks: std::collections::VecDeque<Vec<f32>>,
}

impl BufferSource {
    pub fn new(chunks: Vec<Vec<f32>>) -> Self {
        BufferSource {
            chunks: chunks.into(),
        }
    }

    /// Splits one clip into `CHUNK_SIZE` chunks.
    pub fn from_samples(samples: &[f32]) -> Self {
        Self::new(samples.chunks(CHUNK_SIZE).map(|c| c.to_vec()).collect())
    }
}

impl AudioSource for BufferSource {
    fn read(&mut self) -> Result<Option<Vec<f32>>> {
        Ok(self.chunks.pop_front())
    }

    fn close(&mut self) {
        self.chunks.clear();
    }
}
