pub mod cost;
pub mod dtw;
pub mod features;
pub mod frames;
pub mod result;

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audio::decoder::decode_audio;
use crate::types::AudioData;

use cost::{build_cost_matrix, CostStrategy, FeatureWeights, WeightedCostSettings};
use features::{FeatureBundle, FeatureExtractor, PitchSettings, VibratoSettings};
use result::{Alignments, AnalysisResult, StrategyAlignment};

/// Convenient alias for results returned by analysis modules.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Terminal failures of a single comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// The request did not name exactly two recordings, or its settings are invalid.
    InvalidRequest(String),
    /// A recording decoded to zero samples.
    EmptyInput(String),
    /// A cost matrix with a zero dimension.
    DegenerateMatrix(String),
    /// The audio could not be opened or decoded.
    UnsupportedFormat(String),
    /// Persisting or reading an artifact failed.
    Io(String),
    /// A persisted artifact could not be parsed back.
    Artifact(String),
    /// An analysis worker thread died before producing its result.
    WorkerPanicked(String),
}

impl Display for AnalysisError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisError::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            AnalysisError::EmptyInput(msg) => write!(f, "empty input: {msg}"),
            AnalysisError::DegenerateMatrix(msg) => write!(f, "degenerate cost matrix: {msg}"),
            AnalysisError::UnsupportedFormat(msg) => write!(f, "unsupported format: {msg}"),
            AnalysisError::Io(msg) => write!(f, "i/o error: {msg}"),
            AnalysisError::Artifact(msg) => write!(f, "malformed artifact: {msg}"),
            AnalysisError::WorkerPanicked(stage) => write!(f, "{stage} worker panicked"),
        }
    }
}

impl Error for AnalysisError {}

/// Tunable parameters of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisSettings {
    pub weights: FeatureWeights,
    pub energy_threshold: f32,
    pub vibrato: VibratoSettings,
    pub pitch: PitchSettings,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            weights: FeatureWeights::default(),
            energy_threshold: 0.5,
            vibrato: VibratoSettings::default(),
            pitch: PitchSettings::default(),
        }
    }
}

impl AnalysisSettings {
    pub fn validate(&self) -> Result<()> {
        let weights = [self.weights.mfcc, self.weights.chroma, self.weights.f0];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(AnalysisError::InvalidRequest(format!(
                "feature weights must be finite and non-negative, got {weights:?}"
            )));
        }
        if !(0.0..=1.0).contains(&self.energy_threshold) {
            return Err(AnalysisError::InvalidRequest(format!(
                "energy_threshold must lie in [0, 1], got {}",
                self.energy_threshold
            )));
        }
        let vibrato = &self.vibrato;
        if !(vibrato.window_secs > 0.0) {
            return Err(AnalysisError::InvalidRequest(
                "vibrato window_secs must be positive".to_string(),
            ));
        }
        if !(vibrato.band_low_hz > 0.0 && vibrato.band_low_hz < vibrato.band_high_hz) {
            return Err(AnalysisError::InvalidRequest(format!(
                "vibrato band must satisfy 0 < low < high, got {}..{}",
                vibrato.band_low_hz, vibrato.band_high_hz
            )));
        }
        if !(self.pitch.fmin_hz > 0.0 && self.pitch.fmin_hz < self.pitch.fmax_hz) {
            return Err(AnalysisError::InvalidRequest(format!(
                "pitch range must satisfy 0 < fmin < fmax, got {}..{}",
                self.pitch.fmin_hz, self.pitch.fmax_hz
            )));
        }
        Ok(())
    }

    fn cost_settings(&self) -> WeightedCostSettings {
        WeightedCostSettings {
            weights: self.weights,
            energy_threshold: self.energy_threshold,
        }
    }
}

/// Compares two recordings: features for each, then four DTW alignments.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    settings: AnalysisSettings,
}

impl Analyzer {
    pub fn new(settings: AnalysisSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Decodes and compares exactly two audio files.
    pub fn compare_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<AnalysisResult> {
        let [path_a, path_b] = paths else {
            return Err(AnalysisError::InvalidRequest(format!(
                "exactly two audio files are required, got {}",
                paths.len()
            )));
        };
        let (path_a, path_b) = (path_a.as_ref(), path_b.as_ref());
        info!(file_a = %path_a.display(), file_b = %path_b.display(), "starting comparison");
        let audio_a = load_audio(path_a)?;
        let audio_b = load_audio(path_b)?;
        self.compare_audio([base_name(path_a), base_name(path_b)], &audio_a, &audio_b)
    }

    /// Compares two already decoded recordings labelled by `names`.
    pub fn compare_audio(
        &self,
        names: [String; 2],
        audio_a: &AudioData,
        audio_b: &AudioData,
    ) -> Result<AnalysisResult> {
        let extractor = FeatureExtractor::with_settings(self.settings.pitch, self.settings.vibrato);
        let (bundle_a, bundle_b) = thread::scope(|scope| {
            let worker = scope.spawn(|| extractor.extract(audio_b));
            let bundle_a = extractor.extract(audio_a);
            let bundle_b = join_worker(worker.join(), "feature extraction");
            (bundle_a, bundle_b)
        });
        let (bundle_a, bundle_b) = (bundle_a?, bundle_b?);
        info!(
            frames_a = bundle_a.frame_count,
            frames_b = bundle_b.frame_count,
            "features extracted"
        );
        let alignments = self.align_all(&bundle_a, &bundle_b)?;
        Ok(AnalysisResult {
            files: names,
            features: [bundle_a, bundle_b],
            alignments,
        })
    }

    /// Runs every cost strategy against the same pair of bundles in parallel.
    pub fn align_all(&self, a: &FeatureBundle, b: &FeatureBundle) -> Result<Alignments> {
        let cost_settings = self.settings.cost_settings();
        let mut results = thread::scope(|scope| {
            let handles: Vec<_> = CostStrategy::ALL
                .into_iter()
                .map(|strategy| scope.spawn(move || align_strategy(strategy, a, b, &cost_settings)))
                .collect();
            handles
                .into_iter()
                .map(|handle| join_worker(handle.join(), "alignment"))
                .collect::<Result<Vec<_>>>()
        })?
        .into_iter();
        let mut next = |expected: CostStrategy| {
            results
                .next()
                .filter(|alignment| alignment.strategy == expected)
                .ok_or_else(|| {
                    AnalysisError::DegenerateMatrix(format!("missing {expected} alignment"))
                })
        };
        Ok(Alignments {
            mfcc: next(CostStrategy::Mfcc)?,
            chroma: next(CostStrategy::Chroma)?,
            mixed: next(CostStrategy::Mixed)?,
            weighted: next(CostStrategy::Weighted)?,
        })
    }
}

/// Builds one strategy's cost matrix and aligns it.
pub fn align_strategy(
    strategy: CostStrategy,
    a: &FeatureBundle,
    b: &FeatureBundle,
    settings: &WeightedCostSettings,
) -> Result<StrategyAlignment> {
    let cost = build_cost_matrix(strategy, a, b, settings)?;
    let alignment = dtw::align(&cost)?;
    debug!(
        %strategy,
        steps = alignment.frames.len(),
        total_cost = alignment.total_cost,
        "aligned recordings"
    );
    Ok(StrategyAlignment::from_dtw(strategy, &alignment))
}

fn load_audio(path: &Path) -> Result<AudioData> {
    let audio = decode_audio(path).map_err(|err| {
        AnalysisError::UnsupportedFormat(format!("{}: {err:#}", path.display()))
    })?;
    if audio.is_empty() {
        return Err(AnalysisError::EmptyInput(format!(
            "{} decoded to zero samples",
            path.display()
        )));
    }
    Ok(audio)
}

fn join_worker<T>(joined: thread::Result<Result<T>>, stage: &str) -> Result<T> {
    joined.unwrap_or_else(|_| Err(AnalysisError::WorkerPanicked(stage.to_string())))
}

/// Base file name (extension kept) used to label a recording in artifacts.
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}
