mod chroma;
mod onset;
mod pitch;
mod spectral;
mod vibrato;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use chroma::CHROMA_BINS;
pub use pitch::{framewise_f0, PitchTrack};
pub use spectral::MFCC_COUNT;
pub use vibrato::{detect_vibrato, VibratoSettings};

use crate::analysis::frames::{coarse_frame_length, frame_count};
use crate::analysis::{AnalysisError, Result};
use crate::types::AudioData;

/// pYIN search range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PitchSettings {
    pub fmin_hz: f32,
    pub fmax_hz: f32,
}

impl Default for PitchSettings {
    fn default() -> Self {
        Self {
            fmin_hz: 65.0,
            fmax_hz: 2_093.0,
        }
    }
}

/// Per-frame descriptors of one recording.
///
/// Every per-frame sequence has `frame_count` entries and `mfcc`/`chroma` have
/// `frame_count` columns. `f0_framewise` and `vibrato` hold one value per
/// coarse frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBundle {
    pub waveform: Vec<f32>,
    pub sample_rate: u32,
    pub frame_count: usize,
    pub rms: Array1<f32>,
    pub f0: Array1<f32>,
    pub voiced: Vec<bool>,
    pub f0_framewise: Array1<f32>,
    pub vibrato: Array1<f32>,
    pub onset_times: Vec<f32>,
    pub onset_strength: Array1<f32>,
    pub spectral_centroid: Array1<f32>,
    pub spectral_bandwidth: Array1<f32>,
    pub mfcc: Array2<f32>,
    pub chroma: Array2<f32>,
    pub duration: f32,
}

impl FeatureBundle {
    /// Whether every per-frame descriptor agrees on the frame count.
    pub fn is_consistent(&self) -> bool {
        let n = self.frame_count;
        n == frame_count(self.waveform.len())
            && self.rms.len() == n
            && self.f0.len() == n
            && self.voiced.len() == n
            && self.onset_strength.len() == n
            && self.spectral_centroid.len() == n
            && self.spectral_bandwidth.len() == n
            && self.mfcc.ncols() == n
            && self.chroma.ncols() == n
            && self.f0_framewise.len() == self.vibrato.len()
    }
}

/// Turns decoded waveforms into [`FeatureBundle`]s.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    pitch: PitchSettings,
    vibrato: VibratoSettings,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(pitch: PitchSettings, vibrato: VibratoSettings) -> Self {
        Self { pitch, vibrato }
    }

    pub fn extract(&self, audio: &AudioData) -> Result<FeatureBundle> {
        if audio.is_empty() {
            return Err(AnalysisError::EmptyInput(
                "decoded audio contains no samples".to_string(),
            ));
        }
        if audio.sample_rate == 0 {
            return Err(AnalysisError::UnsupportedFormat(
                "decoded audio reports a zero sample rate".to_string(),
            ));
        }
        let samples = &audio.samples;
        let sample_rate = audio.sample_rate;

        let spectrograms = spectral::compute_spectrograms(samples, sample_rate);
        let mfcc = spectral::compute_mfcc(&spectrograms);
        let chroma = chroma::compute_chroma(&spectrograms);
        let rms = spectral::compute_rms(samples);
        let spectral_centroid = spectral::compute_centroid(&spectrograms);
        let spectral_bandwidth = spectral::compute_bandwidth(&spectrograms);
        let onset_strength = onset::onset_strength(&spectrograms.mel);
        let onset_times = onset::onset_times(&onset_strength, sample_rate);

        let track = pitch::track_pitch(samples, sample_rate, self.pitch.fmin_hz, self.pitch.fmax_hz);
        let block = coarse_frame_length(sample_rate);
        let f0_framewise = framewise_f0(&track, block);
        let vibrato = detect_vibrato(&track.f0, sample_rate, &self.vibrato, block);

        let bundle = FeatureBundle {
            waveform: samples.clone(),
            sample_rate,
            frame_count: spectrograms.frame_count,
            rms,
            f0: Array1::from(track.f0),
            voiced: track.voiced,
            f0_framewise,
            vibrato,
            onset_times,
            onset_strength,
            spectral_centroid,
            spectral_bandwidth,
            mfcc,
            chroma,
            duration: audio.duration_secs(),
        };
        debug!(
            frames = bundle.frame_count,
            onsets = bundle.onset_times.len(),
            voiced = bundle.voiced.iter().filter(|v| **v).count(),
            "extracted features"
        );
        Ok(bundle)
    }
}
