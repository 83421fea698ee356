use ndarray::Array1;

use crate::analysis::frames::{frame_rate, frame_to_seconds};

const TOP_DB: f64 = 80.0;
const PRE_MAX_SECS: f32 = 0.03;
const AVG_SECS: f32 = 0.10;
const WAIT_SECS: f32 = 0.03;
const DELTA: f32 = 0.07;

/// Spectral-flux onset envelope over the log-mel spectrogram, one value per frame.
pub(crate) fn onset_strength(mel: &[Vec<f64>]) -> Array1<f32> {
    if mel.is_empty() {
        return Array1::zeros(0);
    }
    let log_mel = to_decibels(mel);
    let mut envelope = Vec::with_capacity(log_mel.len());
    envelope.push(0.0_f32);
    for pair in log_mel.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        let bands = current.len().max(1) as f64;
        let rise: f64 = current
            .iter()
            .zip(previous.iter())
            .map(|(curr, prev)| (curr - prev).max(0.0))
            .sum();
        envelope.push((rise / bands) as f32);
    }
    Array1::from(envelope)
}

/// Peak-picks the normalised envelope and reports onset instants in seconds.
pub(crate) fn onset_times(envelope: &Array1<f32>, sample_rate: u32) -> Vec<f32> {
    detect_onset_frames(envelope, sample_rate)
        .into_iter()
        .map(|frame| frame_to_seconds(frame, sample_rate))
        .collect()
}

pub(crate) fn detect_onset_frames(envelope: &Array1<f32>, sample_rate: u32) -> Vec<usize> {
    let normalised = normalise(envelope);
    if normalised.is_empty() {
        return Vec::new();
    }
    let rate = frame_rate(sample_rate);
    let pre_max = (PRE_MAX_SECS * rate) as usize;
    let post_max = 1;
    let pre_avg = (AVG_SECS * rate) as usize;
    let post_avg = (AVG_SECS * rate) as usize + 1;
    let wait = (WAIT_SECS * rate) as usize;

    let len = normalised.len();
    let mut onsets = Vec::new();
    let mut last: Option<usize> = None;
    for n in 0..len {
        let value = normalised[n];
        let max_window = &normalised[n.saturating_sub(pre_max)..(n + post_max).min(len)];
        if max_window.iter().any(|&v| v > value) {
            continue;
        }
        let avg_window = &normalised[n.saturating_sub(pre_avg)..(n + post_avg).min(len)];
        let mean = avg_window.iter().sum::<f32>() / avg_window.len() as f32;
        if value < mean + DELTA {
            continue;
        }
        if last.is_some_and(|previous| n - previous <= wait) {
            continue;
        }
        onsets.push(n);
        last = Some(n);
    }
    onsets
}

fn to_decibels(mel: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let db: Vec<Vec<f64>> = mel
        .iter()
        .map(|row| row.iter().map(|p| 10.0 * p.max(1e-10).log10()).collect())
        .collect();
    let peak = db
        .iter()
        .flat_map(|row| row.iter().copied())
        .fold(f64::NEG_INFINITY, f64::max);
    let floor = peak - TOP_DB;
    db.into_iter()
        .map(|row| row.into_iter().map(|v| v.max(floor)).collect())
        .collect()
}

fn normalise(envelope: &Array1<f32>) -> Vec<f32> {
    let min = envelope.iter().copied().fold(f32::INFINITY, f32::min);
    let max = envelope.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !range.is_finite() || range <= f32::EPSILON {
        return vec![0.0; envelope.len()];
    }
    envelope.iter().map(|v| (v - min) / range).collect()
}
