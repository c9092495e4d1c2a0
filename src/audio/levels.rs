//! Signal level measurement: RMS energy, zero-crossing rate, and the
//! VU meter line the listener prints while running.

/// Root mean square energy of the samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Zero-crossing rate: the fraction of adjacent sample pairs where the
/// signal crosses zero, counting a landing exactly on zero as a cross.
pub fn zcr(samples: &[f32]) -> f32 {
    if samples.len() <= 1 {
        return 0.0;
    }
    let mut count = 0;
    for i in 1..samples.len() {
        let prev = samples[i - 1];
        let cur = samples[i];
        if (prev > 0.0 && cur <= 0.0) || (prev < 0.0 && cur >= 0.0) {
            count += 1;
        }
    }
    count as f32 / (samples.len() - 1) as f32
}

/// RMS and peak absolute level of a chunk, for metering.
pub fn levels(samples: &[f32]) -> (f32, f32) {
    let peak = samples.iter().fold(0.0f32, |p, &s| p.max(s.abs()));
    (rms(samples), peak)
}

/// ASCII VU bar for a level in [0, 1].
pub fn vu_bar(level: f32, width: usize) -> String {
    let level = level.clamp(0.0, 1.0);
    let filled = (level * width as f32).round() as usize;
    let filled = filled.min(width);
    format!("[{}{}]", "#".repeat(filled), " ".repeat(width - filled))
}
