//! Regroups an arbitrary-size sample stream into fixed-size windows.
//!
//! Capture devices deliver whatever buffer sizes they like; the
//! listener feeds them through a `SlidingWindow` to obtain uniform
//! chunks for the engine.

pub struct SlidingWindow {
    window_size: usize,
    hop_size: usize,
    buffer: Vec<f32>,
}

impl SlidingWindow {
    pub fn new(window_size: usize, hop_size: usize) -> Self {
        SlidingWindow {
            window_size,
            hop_size,
            buffer: Vec::with_capacity(window_size * 2),
        }
    }

    pub fn add_samples(&mut self, samples: &[f32]) {
        self.buffer.extend_from_slice(samples);
    }

    /// Returns the next window if enough samples have accumulated,
    /// advancing the stream by the hop size.
    pub fn next_window(&mut self) -> Option<Vec<f32>> {
        if self.buffer.len() < self.window_size {
            return None;
        }
        let window = self.buffer[..self.window_size].to_vec();
        self.buffer.drain(..self.hop_size);
        Some(window)
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
