use aus::analysis;
use aus::analysis::mel::MelFilterbank;
use aus::spectrum;
use aus::WindowType;
use ndarray::{Array1, Array2};

use crate::analysis::frames::{frame_count, FFT_SIZE, HOP_LENGTH};

pub const MFCC_COUNT: usize = 13;
pub(crate) const MEL_BANDS: usize = 80;
const MIN_FREQ: f64 = 20.0;
const POWER_FLOOR: f64 = 1e-10;

/// Short-time spectra of one waveform, one row per centred frame.
pub(crate) struct SpectrogramBundle {
    pub frame_count: usize,
    pub freqs: Vec<f64>,
    pub magnitude: Vec<Vec<f64>>,
    pub power: Vec<Vec<f64>>,
    pub mel: Vec<Vec<f64>>,
}

pub(crate) fn compute_spectrograms(samples: &[f32], sample_rate: u32) -> SpectrogramBundle {
    let frames = frame_count(samples.len());
    let bins = FFT_SIZE / 2 + 1;
    let padded: Vec<f64> = centre_pad(samples).into_iter().map(f64::from).collect();

    let stft = spectrum::rstft(&padded, FFT_SIZE, HOP_LENGTH, WindowType::Hanning);
    let (magnitude, _) = spectrum::complex_to_polar_rstft(&stft);
    let magnitude = conform_frames(magnitude, frames, bins);
    let power: Vec<Vec<f64>> = analysis::make_power_spectrogram(&magnitude)
        .into_iter()
        .map(|row| row.into_iter().map(|p| p + POWER_FLOOR).collect())
        .collect();

    let freqs = spectrum::rfftfreq(FFT_SIZE, sample_rate);
    let filterbank = MelFilterbank::new(
        MIN_FREQ,
        (sample_rate as f64) / 2.0,
        MEL_BANDS,
        &freqs,
        true,
    );
    let mel = conform_frames(
        analysis::mel::make_mel_spectrogram(&power, &filterbank),
        frames,
        MEL_BANDS,
    );

    SpectrogramBundle {
        frame_count: frames,
        freqs,
        magnitude,
        power,
        mel,
    }
}

/// MFCC matrix shaped `MFCC_COUNT x frames`; non-finite coefficients become zero.
pub(crate) fn compute_mfcc(bundle: &SpectrogramBundle) -> Array2<f32> {
    let raw = conform_frames(
        analysis::mel::mfcc_spectrogram(&bundle.mel, MFCC_COUNT, None),
        bundle.frame_count,
        MFCC_COUNT,
    );
    let mut mfcc = Array2::zeros((MFCC_COUNT, bundle.frame_count));
    for (frame, row) in raw.iter().enumerate() {
        for (coeff, value) in row.iter().take(MFCC_COUNT).enumerate() {
            if value.is_finite() {
                mfcc[(coeff, frame)] = *value as f32;
            }
        }
    }
    mfcc
}

/// Root-mean-square energy of each centred `FFT_SIZE` window.
pub(crate) fn compute_rms(samples: &[f32]) -> Array1<f32> {
    let frames = frame_count(samples.len());
    let padded = centre_pad(samples);
    let rms = (0..frames)
        .map(|frame| {
            let start = frame * HOP_LENGTH;
            let end = (start + FFT_SIZE).min(padded.len());
            let window = &padded[start..end];
            let energy: f32 = window.iter().map(|s| s * s).sum();
            (energy / FFT_SIZE as f32).sqrt()
        })
        .collect::<Vec<_>>();
    Array1::from(rms)
}

/// Magnitude-weighted mean frequency per frame, 0 Hz for silent frames.
pub(crate) fn compute_centroid(bundle: &SpectrogramBundle) -> Array1<f32> {
    bundle
        .magnitude
        .iter()
        .map(|frame| centroid_of(frame, &bundle.freqs).unwrap_or(0.0) as f32)
        .collect()
}

/// Magnitude-weighted spread around the centroid per frame.
pub(crate) fn compute_bandwidth(bundle: &SpectrogramBundle) -> Array1<f32> {
    bundle
        .magnitude
        .iter()
        .map(|frame| {
            let Some(centroid) = centroid_of(frame, &bundle.freqs) else {
                return 0.0;
            };
            let total: f64 = frame.iter().sum();
            let spread: f64 = frame
                .iter()
                .zip(bundle.freqs.iter())
                .map(|(mag, freq)| mag * (freq - centroid).powi(2))
                .sum();
            (spread / total).sqrt() as f32
        })
        .collect()
}

fn centroid_of(frame: &[f64], freqs: &[f64]) -> Option<f64> {
    let total: f64 = frame.iter().sum();
    if total <= f64::EPSILON {
        return None;
    }
    let centroid = analysis::spectral_centroid(frame, freqs);
    centroid.is_finite().then_some(centroid)
}

fn centre_pad(samples: &[f32]) -> Vec<f32> {
    let pad = FFT_SIZE / 2;
    let mut padded = Vec::with_capacity(samples.len() + 2 * pad);
    padded.resize(pad, 0.0);
    padded.extend_from_slice(samples);
    padded.resize(samples.len() + 2 * pad, 0.0);
    padded
}

/// Forces a frame-major matrix to exactly `frames` rows of `width` values.
fn conform_frames(mut rows: Vec<Vec<f64>>, frames: usize, width: usize) -> Vec<Vec<f64>> {
    rows.truncate(frames);
    for row in rows.iter_mut() {
        row.resize(width, 0.0);
    }
    rows.resize(frames, vec![0.0; width]);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn conform_pads_and_truncates() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        let padded = conform_frames(rows.clone(), 3, 2);
        assert_eq!(padded, vec![vec![1.0, 2.0], vec![3.0, 0.0], vec![0.0, 0.0]]);
        let truncated = conform_frames(rows, 1, 2);
        assert_eq!(truncated, vec![vec![1.0, 2.0]]);
    }

    #[test]
    fn rms_of_silence_is_zero_and_matches_frame_count() {
        let rms = compute_rms(&vec![0.0; 4_000]);
        assert_eq!(rms.len(), frame_count(4_000));
        assert!(rms.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn rms_of_full_scale_sine_approaches_inverse_sqrt_two() {
        let samples = sine(440.0, 16_000, 16_000);
        let rms = compute_rms(&samples);
        let middle = rms[rms.len() / 2];
        assert!((middle - std::f32::consts::FRAC_1_SQRT_2).abs() < 0.02);
    }

    #[test]
    fn centroid_tracks_pure_tone() {
        let samples = sine(1_000.0, 16_000, 16_000);
        let bundle = compute_spectrograms(&samples, 16_000);
        let centroid = compute_centroid(&bundle);
        assert_eq!(centroid.len(), bundle.frame_count);
        let middle = centroid[centroid.len() / 2];
        assert!((middle - 1_000.0).abs() < 150.0, "centroid was {middle}");
    }

    #[test]
    fn centroid_helpers_handle_silence() {
        let freqs = vec![0.0, 100.0, 200.0];
        assert_eq!(centroid_of(&[0.0, 0.0, 0.0], &freqs), None);
        let centroid = centroid_of(&[0.0, 1.0, 1.0], &freqs).unwrap();
        assert!((centroid - 150.0).abs() < 1e-9);
    }
}
