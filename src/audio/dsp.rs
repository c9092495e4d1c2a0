//! Spectral primitives: pre-emphasis, Hamming window, radix-2 FFT and
//! the framed magnitude STFT built on top of them.

use std::f64::consts::PI;

/// Applies a first-order pre-emphasis filter: y[n] = x[n] - coeff * x[n-1].
///
/// Amplifies high frequencies so the Mel features are less dominated by
/// low-frequency energy. Length is preserved and y[0] = x[0].
pub fn pre_emphasis(samples: &[f32], coeff: f32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(samples.len());
    out.push(samples[0]);
    for i in 1..samples.len() {
        out.push(samples[i] - coeff * samples[i - 1]);
    }
    out
}

/// Hamming window of the given size: w[n] = 0.54 - 0.46 cos(2 pi n / (N-1)).
pub fn hamming_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| (0.54 - 0.46 * (2.0 * PI * i as f64 / (size - 1) as f64).cos()) as f32)
        .collect()
}

/// Minimal complex value for the FFT. Kept private to this module; the
/// public STFT surface only deals in magnitudes.
#[derive(Debug, Clone, Copy)]
struct Complex {
    re: f64,
    im: f64,
}

impl Complex {
    fn add(self, o: Complex) -> Complex {
        Complex {
            re: self.re + o.re,
            im: self.im + o.im,
        }
    }

    fn sub(self, o: Complex) -> Complex {
        Complex {
            re: self.re - o.re,
            im: self.im - o.im,
        }
    }

    fn mul(self, o: Complex) -> Complex {
        Complex {
            re: self.re * o.re - self.im * o.im,
            im: self.re * o.im + self.im * o.re,
        }
    }

    fn abs(self) -> f64 {
        (self.re * self.re + self.im * self.im).sqrt()
    }
}

/// Recursive Cooley-Tukey FFT. Input length must be a power of two,
/// which the STFT contract guarantees for its window size.
fn fft(input: &[Complex]) -> Vec<Complex> {
    let n = input.len();
    if n <= 1 {
        return input.to_vec();
    }

    let even: Vec<Complex> = input.iter().step_by(2).copied().collect();
    let odd: Vec<Complex> = input.iter().skip(1).step_by(2).copied().collect();

    let even_fft = fft(&even);
    let odd_fft = fft(&odd);

    let mut result = vec![Complex { re: 0.0, im: 0.0 }; n];
    for k in 0..n / 2 {
        let angle = -2.0 * PI * k as f64 / n as f64;
        let twiddle = Complex {
            re: angle.cos(),
            im: angle.sin(),
        };
        let t = twiddle.mul(odd_fft[k]);
        result[k] = even_fft[k].add(t);
        result[k + n / 2] = even_fft[k].sub(t);
    }
    result
}

/// Short-Time Fourier Transform over Hamming-windowed frames.
///
/// Produces floor((len - window) / hop) + 1 frames, each holding the
/// magnitudes of the first window/2 + 1 bins (positive frequencies).
/// Returns an empty vec when there are not enough samples for a single
/// frame; callers treat that as "not enough data".
pub fn stft(samples: &[f32], window_size: usize, hop_size: usize) -> Vec<Vec<f32>> {
    if samples.len() < window_size {
        return Vec::new();
    }
    let num_frames = (samples.len() - window_size) / hop_size + 1;

    let window = hamming_window(window_size);
    let num_bins = window_size / 2 + 1;
    let mut spectrogram = Vec::with_capacity(num_frames);

    for i in 0..num_frames {
        let start = i * hop_size;
        let frame: Vec<Complex> = (0..window_size)
            .map(|j| Complex {
                re: (samples[start + j] * window[j]) as f64,
                im: 0.0,
            })
            .collect();

        let spectrum = fft(&frame);
        let magnitudes: Vec<f32> = spectrum[..num_bins].iter().map(|c| c.abs() as f32).collect();
        spectrogram.push(magnitudes);
    }

    spectrogram
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pre_emphasis_preserves_length_and_first_sample() {
        let x = vec![0.5, 0.4, 0.3, 0.2];
        let y = pre_emphasis(&x, 0.97);
        assert_eq!(y.len(), x.len());
        assert_eq!(y[0], x[0]);
        assert_relative_eq!(y[1], 0.4 - 0.97 * 0.5, epsilon = 1e-6);
    }

    #[test]
    fn pre_emphasis_empty_input() {
        assert!(pre_emphasis(&[], 0.97).is_empty());
    }

    #[test]
    fn hamming_endpoints() {
        let w = hamming_window(64);
        assert_eq!(w.len(), 64);
        assert_relative_eq!(w[0], 0.08, epsilon = 1e-4);
        assert_relative_eq!(w[63], 0.08, epsilon = 1e-4);
        // Peak in the middle.
        assert!(w[31] > 0.99 && w[32] > 0.99);
    }

    #[test]
    fn fft_of_impulse_is_flat() {
        let mut input = vec![Complex { re: 0.0, im: 0.0 }; 8];
        input[0].re = 1.0;
        let out = fft(&input);
        for bin in out {
            assert_relative_eq!(bin.abs(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn fft_finds_single_tone() {
        // A pure cosine at bin 4 of a 32-point FFT.
        let n = 32;
        let input: Vec<Complex> = (0..n)
            .map(|i| Complex {
                re: (2.0 * PI * 4.0 * i as f64 / n as f64).cos(),
                im: 0.0,
            })
            .collect();
        let out = fft(&input);
        // Energy concentrated at bins 4 and n-4.
        assert_relative_eq!(out[4].abs(), n as f64 / 2.0, epsilon = 1e-6);
        assert!(out[2].abs() < 1e-6);
    }

    #[test]
    fn stft_frame_and_bin_counts() {
        let samples = vec![0.1; 16000];
        let frames = stft(&samples, 512, 256);
        assert_eq!(frames.len(), (16000 - 512) / 256 + 1);
        assert_eq!(frames[0].len(), 512 / 2 + 1);
    }

    #[test]
    fn stft_too_short_is_empty() {
        let samples = vec![0.1; 100];
        assert!(stft(&samples, 512, 256).is_empty());
    }
}
