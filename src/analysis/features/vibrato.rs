//! Vibrato strength: band-limited spectral energy of the local pitch contour.
//!
//! Each fine frame gets a centred window of the f0 track; the window is detrended,
//! Hann tapered and transformed, and the power falling inside the modulation band
//! is the raw strength. Raw strengths are scaled by their maximum and averaged
//! into coarse frames.

use ndarray::Array1;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

use crate::analysis::frames::{frame_rate, HOP_LENGTH};

const EPSILON: f32 = 1e-10;

/// Analysis parameters for [`detect_vibrato`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VibratoSettings {
    pub window_secs: f32,
    pub band_low_hz: f32,
    pub band_high_hz: f32,
}

impl Default for VibratoSettings {
    fn default() -> Self {
        Self {
            window_secs: 0.5,
            band_low_hz: 4.0,
            band_high_hz: 8.0,
        }
    }
}

impl VibratoSettings {
    /// Window length in fine frames, never less than one.
    pub fn window_frames(&self, sample_rate: u32) -> usize {
        ((frame_rate(sample_rate) * self.window_secs).round() as usize).max(1)
    }
}

/// Normalised vibrato strength per coarse frame of `block` fine frames, each in `[0, 1]`.
pub fn detect_vibrato(
    f0: &[f32],
    sample_rate: u32,
    settings: &VibratoSettings,
    block: usize,
) -> Array1<f32> {
    let raw = raw_vibrato_energy(f0, sample_rate, settings);
    let peak = raw.iter().copied().fold(0.0_f32, f32::max);
    let normalised: Vec<f32> = raw.iter().map(|v| v / (peak + EPSILON)).collect();
    block_average(&normalised, block)
}

/// Unnormalised in-band energy for every fine frame of `f0`.
pub(crate) fn raw_vibrato_energy(
    f0: &[f32],
    sample_rate: u32,
    settings: &VibratoSettings,
) -> Vec<f32> {
    let window = settings.window_frames(sample_rate);
    let half = window / 2;
    let mut padded = vec![0.0_f32; f0.len() + 2 * half];
    padded[half..half + f0.len()].copy_from_slice(f0);

    let taper = hann(window);
    let bins = band_bins(window, sample_rate, settings);
    let fft = FftPlanner::<f32>::new().plan_fft_forward(window);
    let mut buffer = vec![Complex::new(0.0_f32, 0.0); window];

    (0..f0.len())
        .map(|i| {
            let segment = &padded[i..i + window];
            if segment.iter().all(|v| *v == 0.0) {
                return 0.0;
            }
            let mean = segment.iter().sum::<f32>() / window as f32;
            for ((slot, value), weight) in buffer.iter_mut().zip(segment).zip(&taper) {
                *slot = Complex::new((value - mean) * weight, 0.0);
            }
            fft.process(&mut buffer);
            bins.iter().map(|&bin| buffer[bin].norm_sqr()).sum()
        })
        .collect()
}

/// Positive-frequency bins of a `window`-point transform inside the modulation band.
fn band_bins(window: usize, sample_rate: u32, settings: &VibratoSettings) -> Vec<usize> {
    let window_secs = window as f32 * HOP_LENGTH as f32 / sample_rate.max(1) as f32;
    let spacing = 1.0 / window_secs;
    (0..=window / 2)
        .filter(|&bin| {
            let freq = bin as f32 * spacing;
            freq >= settings.band_low_hz && freq <= settings.band_high_hz
        })
        .collect()
}

/// Periodic Hann taper.
fn hann(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * n as f32 / len as f32).cos())
        .collect()
}

fn block_average(values: &[f32], block: usize) -> Array1<f32> {
    values
        .chunks(block.max(1))
        .map(|chunk| chunk.iter().sum::<f32>() / chunk.len() as f32)
        .collect()
}
