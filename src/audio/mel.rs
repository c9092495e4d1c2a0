//! Mel-scale filterbank construction and application.

/// Converts a frequency in Hz to the Mel scale.
pub fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

/// Converts a Mel value back to Hz.
pub fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0f64.powf(mel / 2595.0) - 1.0)
}

/// Builds `num_filters` triangular filters spaced linearly on the Mel
/// scale between `min_hz` and `max_hz`.
///
/// Each filter is a row of `fft_size / 2 + 1` weights. The triangles
/// rise from their start bin to the mid bin and fall from mid to end;
/// zero-width triangles and out-of-range bins contribute nothing.
pub fn mel_filterbank(
    num_filters: usize,
    fft_size: usize,
    sample_rate: usize,
    min_hz: f64,
    max_hz: f64,
) -> Vec<Vec<f32>> {
    let num_bins = fft_size / 2 + 1;
    let min_mel = hz_to_mel(min_hz);
    let max_mel = hz_to_mel(max_hz);

    let bin_points: Vec<i64> = (0..num_filters + 2)
        .map(|i| {
            let mel = min_mel + i as f64 * (max_mel - min_mel) / (num_filters + 1) as f64;
            let hz = mel_to_hz(mel);
            ((fft_size + 1) as f64 * hz / sample_rate as f64).floor() as i64
        })
        .collect();

    let mut filters = Vec::with_capacity(num_filters);
    for i in 0..num_filters {
        let mut filter = vec![0.0f32; num_bins];
        let start = bin_points[i];
        let mid = bin_points[i + 1];
        let end = bin_points[i + 2];

        for j in start..mid {
            if j >= 0 && (j as usize) < num_bins && mid != start {
                filter[j as usize] = (j - start) as f32 / (mid - start) as f32;
            }
        }
        for j in mid..end {
            if j >= 0 && (j as usize) < num_bins && end != mid {
                filter[j as usize] = (end - j) as f32 / (end - mid) as f32;
            }
        }
        filters.push(filter);
    }

    filters
}

/// Dots a single STFT magnitude frame with every filter in the bank.
pub fn apply_filterbank(frame: &[f32], filterbank: &[Vec<f32>]) -> Vec<f32> {
    filterbank
        .iter()
        .map(|filter| {
            filter
                .iter()
                .zip(frame)
                .map(|(w, m)| w * m)
                .sum::<f32>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mel_scale_round_trip() {
        for hz in [0.0, 100.0, 440.0, 4000.0, 8000.0] {
            assert_relative_eq!(mel_to_hz(hz_to_mel(hz)), hz, epsilon = 1e-6);
        }
    }

    #[test]
    fn filterbank_dimensions() {
        let bank = mel_filterbank(40, 512, 16000, 0.0, 8000.0);
        assert_eq!(bank.len(), 40);
        for filter in &bank {
            assert_eq!(filter.len(), 512 / 2 + 1);
        }
    }

    #[test]
    fn filters_are_triangular_and_bounded() {
        let bank = mel_filterbank(40, 512, 16000, 0.0, 8000.0);
        for filter in &bank {
            assert!(filter.iter().all(|&w| (0.0..=1.0).contains(&w)));
            // Every filter should have at least one non-zero weight.
            assert!(filter.iter().any(|&w| w > 0.0));
        }
    }

    #[test]
    fn apply_filterbank_dots_each_row() {
        let bank = vec![vec![1.0, 0.0, 0.0], vec![0.0, 0.5, 0.5]];
        let frame = vec![2.0, 4.0, 6.0];
        let out = apply_filterbank(&frame, &bank);
        assert_eq!(out, vec![2.0, 5.0]);
    }
}
