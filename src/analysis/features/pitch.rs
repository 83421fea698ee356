use std::panic;

use aus::analysis;
use ndarray::Array1;
use tracing::{debug, warn};

use crate::analysis::frames::{frame_count, FFT_SIZE, HOP_LENGTH};

/// Fundamental frequency per fine frame with an explicit voicing flag.
///
/// `f0` keeps the `0.0` sentinel for unvoiced frames so it can be serialised
/// as-is, while `voiced` is what downstream averaging consults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PitchTrack {
    pub f0: Vec<f32>,
    pub voiced: Vec<bool>,
}

impl PitchTrack {
    /// Builds a track from raw estimates; non-finite or non-positive values are unvoiced.
    pub fn from_raw(pitches: &[f32], voiced: &[bool]) -> Self {
        let (f0, voiced) = pitches
            .iter()
            .zip(voiced.iter().chain(std::iter::repeat(&true)))
            .map(|(&pitch, &flag)| {
                if flag && pitch.is_finite() && pitch > 0.0 {
                    (pitch, true)
                } else {
                    (0.0, false)
                }
            })
            .unzip();
        Self { f0, voiced }
    }

    pub fn unvoiced(len: usize) -> Self {
        Self {
            f0: vec![0.0; len],
            voiced: vec![false; len],
        }
    }

    pub fn len(&self) -> usize {
        self.f0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.f0.is_empty()
    }
}

/// Runs pYIN over `samples` and resamples the estimates onto the fine frame grid.
pub(crate) fn track_pitch(
    samples: &[f32],
    sample_rate: u32,
    fmin_hz: f32,
    fmax_hz: f32,
) -> PitchTrack {
    let frames = frame_count(samples.len());
    if samples.len() < FFT_SIZE {
        debug!(samples = samples.len(), "clip shorter than one pitch frame; marking unvoiced");
        return PitchTrack::unvoiced(frames);
    }
    let audio: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
    // pyin 1.2 unwraps a negative pitch-bin index when interpolation lands below fmin.
    let estimate = panic::catch_unwind(|| {
        analysis::pyin_pitch_estimator(
            &audio,
            sample_rate,
            fmin_hz as f64,
            fmax_hz as f64,
            FFT_SIZE,
        )
    });
    let (timestamps, pitches, voiced_flags, _confidence) = match estimate {
        Ok(estimate) => estimate,
        Err(_) => {
            warn!(
                samples = samples.len(),
                sample_rate, "pitch tracker failed on this clip; marking unvoiced"
            );
            return PitchTrack::unvoiced(frames);
        }
    };
    let pitches: Vec<f32> = pitches.iter().map(|&p| p as f32).collect();
    let raw = PitchTrack::from_raw(&pitches, &voiced_flags);
    let timestamps: Vec<f32> = timestamps.iter().map(|&t| t as f32).collect();
    align_to_frames(&raw, &timestamps, frames, sample_rate)
}

/// Nearest-estimate resampling of `raw` onto `frame_count` fine frames.
fn align_to_frames(
    raw: &PitchTrack,
    timestamps: &[f32],
    frame_count: usize,
    sample_rate: u32,
) -> PitchTrack {
    if raw.is_empty() {
        return PitchTrack::unvoiced(frame_count);
    }
    let use_timestamps = timestamps.len() == raw.len();
    let mut aligned = PitchTrack::unvoiced(frame_count);
    for frame in 0..frame_count {
        let source = if use_timestamps {
            let time = (frame * HOP_LENGTH) as f32 / sample_rate.max(1) as f32;
            nearest_index(timestamps, time)
        } else {
            let denom = (frame_count - 1).max(1) as f32;
            (frame as f32 * (raw.len() - 1) as f32 / denom).round() as usize
        };
        let source = source.min(raw.len() - 1);
        aligned.f0[frame] = raw.f0[source];
        aligned.voiced[frame] = raw.voiced[source];
    }
    aligned
}

fn nearest_index(sorted: &[f32], target: f32) -> usize {
    let upper = sorted.partition_point(|&t| t < target);
    if upper == 0 {
        return 0;
    }
    if upper >= sorted.len() {
        return sorted.len() - 1;
    }
    let lower = upper - 1;
    if (target - sorted[lower]).abs() <= (sorted[upper] - target).abs() {
        lower
    } else {
        upper
    }
}

/// Mean of the voiced estimates in each block of `block` frames, `0.0` for silent blocks.
pub fn framewise_f0(track: &PitchTrack, block: usize) -> Array1<f32> {
    let block = block.max(1);
    track
        .f0
        .chunks(block)
        .zip(track.voiced.chunks(block))
        .map(|(values, flags)| {
            let (sum, count) = values
                .iter()
                .zip(flags.iter())
                .filter(|(_, voiced)| **voiced)
                .fold((0.0_f32, 0usize), |(sum, count), (v, _)| (sum + v, count + 1));
            if count == 0 {
                0.0
            } else {
                sum / count as f32
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaning_replaces_invalid_values_with_zero() {
        let track = PitchTrack::from_raw(
            &[220.0, f32::NAN, f32::INFINITY, 0.0, 330.0, 440.0],
            &[true, true, true, true, false, true],
        );
        assert_eq!(track.f0, vec![220.0, 0.0, 0.0, 0.0, 0.0, 440.0]);
        assert_eq!(track.voiced, vec![true, false, false, false, false, true]);
    }

    #[test]
    fn framewise_average_ignores_unvoiced_frames() {
        let track = PitchTrack::from_raw(
            &[200.0, 0.0, 400.0, 0.0, 0.0, 0.0, 100.0],
            &[true; 7],
        );
        let framewise = framewise_f0(&track, 3);
        assert_eq!(framewise.len(), 3);
        assert_eq!(framewise.to_vec(), vec![300.0, 0.0, 100.0]);
    }

    #[test]
    fn framewise_length_is_ceiling_of_blocks() {
        let track = PitchTrack::unvoiced(44);
        assert_eq!(framewise_f0(&track, 21).len(), 3);
        assert_eq!(framewise_f0(&track, 0).len(), 44);
    }

    #[test]
    fn alignment_picks_nearest_timestamp() {
        let raw = PitchTrack::from_raw(&[100.0, 200.0, 300.0], &[true; 3]);
        // estimates every 1024 samples at 1024 Hz, i.e. one per second
        let aligned = align_to_frames(&raw, &[0.0, 1.0, 2.0], 5, 1024);
        assert_eq!(aligned.f0, vec![100.0, 100.0, 200.0, 200.0, 300.0]);
    }

    #[test]
    fn alignment_without_timestamps_stretches_proportionally() {
        let raw = PitchTrack::from_raw(&[100.0, 300.0], &[true, false]);
        let aligned = align_to_frames(&raw, &[], 4, 16_000);
        assert_eq!(aligned.f0, vec![100.0, 100.0, 0.0, 0.0]);
        assert_eq!(aligned.voiced, vec![true, true, false, false]);
    }

    #[test]
    fn two_note_phrase_with_rest_tracks_every_frame() {
        let sample_rate = 16_000;
        let note = |freq: f32, secs: f32| -> Vec<f32> {
            let len = (secs * sample_rate as f32) as usize;
            let step = 2.0 * std::f32::consts::PI * freq / sample_rate as f32;
            (0..len).map(|i| 0.6 * (step * i as f32).sin()).collect()
        };
        let mut samples = note(262.0, 0.6);
        samples.extend(vec![0.0; (0.3 * sample_rate as f32) as usize]);
        samples.extend(note(392.0, 0.6));

        let track = track_pitch(&samples, sample_rate, 65.0, 2_093.0);
        assert_eq!(track.len(), frame_count(samples.len()));
        assert_eq!(track.voiced.len(), track.len());
        for (f0, voiced) in track.f0.iter().zip(track.voiced.iter()) {
            assert_eq!(*voiced, *f0 > 0.0);
        }
    }

    #[test]
    fn short_clips_are_unvoiced() {
        let track = track_pitch(&[0.1; 100], 16_000, 65.0, 2_093.0);
        assert_eq!(track, PitchTrack::unvoiced(1));
    }
}
