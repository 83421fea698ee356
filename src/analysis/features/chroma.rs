//! CENS chroma: pitch-class energy, quantised, smoothed over time and L2 normalised.

use ndarray::{Array2, Axis};

use super::spectral::SpectrogramBundle;

pub const CHROMA_BINS: usize = 12;
const MIN_PITCH_HZ: f64 = 27.5;
const MAX_PITCH_HZ: f64 = 5_000.0;
const CENS_THRESHOLDS: [f32; 4] = [0.4, 0.2, 0.1, 0.05];
const CENS_STEP: f32 = 0.25;
const SMOOTHING_FRAMES: usize = 41;
const EPSILON: f32 = 1e-12;

/// Chroma matrix shaped `CHROMA_BINS x frames`, pitch class 0 = C.
pub(crate) fn compute_chroma(bundle: &SpectrogramBundle) -> Array2<f32> {
    let classes = pitch_classes(&bundle.freqs);
    let mut chroma = Array2::<f32>::zeros((CHROMA_BINS, bundle.frame_count));
    for (frame, power) in bundle.power.iter().enumerate() {
        for (bin, energy) in power.iter().enumerate() {
            if let Some(Some(class)) = classes.get(bin) {
                chroma[(*class, frame)] += *energy as f32;
            }
        }
    }
    l1_normalize_columns(&mut chroma);
    chroma.mapv_inplace(quantize);
    let mut smoothed = smooth_rows(&chroma, &hann_kernel(SMOOTHING_FRAMES));
    l2_normalize_columns(&mut smoothed);
    smoothed
}

fn pitch_classes(freqs: &[f64]) -> Vec<Option<usize>> {
    freqs
        .iter()
        .map(|&freq| {
            if !(MIN_PITCH_HZ..=MAX_PITCH_HZ).contains(&freq) {
                return None;
            }
            let midi = 69.0 + 12.0 * (freq / 440.0).log2();
            Some((midi.round() as i64).rem_euclid(CHROMA_BINS as i64) as usize)
        })
        .collect()
}

fn quantize(value: f32) -> f32 {
    CENS_THRESHOLDS
        .iter()
        .filter(|&&threshold| value > threshold)
        .count() as f32
        * CENS_STEP
}

fn hann_kernel(len: usize) -> Vec<f32> {
    let denom = (len + 1) as f32;
    let raw: Vec<f32> = (1..=len)
        .map(|k| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * k as f32 / denom).cos())
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|w| w / total.max(EPSILON)).collect()
}

/// Centred convolution of each row with `kernel`, zero beyond the edges.
fn smooth_rows(input: &Array2<f32>, kernel: &[f32]) -> Array2<f32> {
    let frames = input.len_of(Axis(1));
    let radius = kernel.len() / 2;
    let mut output = Array2::zeros(input.raw_dim());
    for (row_in, mut row_out) in input.outer_iter().zip(output.outer_iter_mut()) {
        for t in 0..frames {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let Some(source) = (t + k).checked_sub(radius) else {
                    continue;
                };
                if source < frames {
                    acc += row_in[source] * weight;
                }
            }
            row_out[t] = acc;
        }
    }
    output
}

fn l1_normalize_columns(matrix: &mut Array2<f32>) {
    for mut column in matrix.axis_iter_mut(Axis(1)) {
        let total: f32 = column.iter().map(|v| v.abs()).sum();
        if total > EPSILON {
            column.mapv_inplace(|v| v / total);
        }
    }
}

fn l2_normalize_columns(matrix: &mut Array2<f32>) {
    for mut column in matrix.axis_iter_mut(Axis(1)) {
        let norm = column.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > EPSILON {
            column.mapv_inplace(|v| v / norm);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::spectral::compute_spectrograms;

    #[test]
    fn maps_reference_pitches_to_classes() {
        let classes = pitch_classes(&[10.0, 261.63, 440.0, 880.0, 6_000.0]);
        assert_eq!(classes, vec![None, Some(0), Some(9), Some(9), None]);
    }

    #[test]
    fn quantisation_uses_cens_steps() {
        assert_eq!(quantize(0.0), 0.0);
        assert_eq!(quantize(0.07), 0.25);
        assert_eq!(quantize(0.5), 1.0);
    }

    #[test]
    fn kernel_is_normalised() {
        let kernel = hann_kernel(SMOOTHING_FRAMES);
        assert_eq!(kernel.len(), SMOOTHING_FRAMES);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(kernel.iter().all(|w| *w > 0.0));
    }

    #[test]
    fn a440_dominates_class_nine() {
        let sample_rate = 22_050;
        let samples: Vec<f32> = (0..sample_rate)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
            .collect();
        let bundle = compute_spectrograms(&samples, sample_rate as u32);
        let chroma = compute_chroma(&bundle);
        assert_eq!(chroma.dim(), (CHROMA_BINS, bundle.frame_count));
        let middle = chroma.column(bundle.frame_count / 2);
        let (best, _) = middle
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |acc, (i, v)| if *v > acc.1 { (i, *v) } else { acc });
        assert_eq!(best, 9);
        let norm = middle.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn silent_columns_stay_zero() {
        let mut matrix = Array2::<f32>::zeros((CHROMA_BINS, 3));
        l1_normalize_columns(&mut matrix);
        l2_normalize_columns(&mut matrix);
        assert!(matrix.iter().all(|v| *v == 0.0));
    }
}
