use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::analysis::cost::CostStrategy;
use crate::analysis::dtw::{DtwAlignment, WarpPath};
use crate::analysis::features::FeatureBundle;
use crate::analysis::frames::frame_count;
use crate::analysis::{AnalysisError, Result};

/// Warp path plus cost summary for one strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyAlignment {
    pub strategy: CostStrategy,
    pub path: WarpPath,
    pub total_cost: f64,
    pub cost_per_step: f64,
}

impl StrategyAlignment {
    pub fn from_dtw(strategy: CostStrategy, alignment: &DtwAlignment) -> Self {
        Self {
            strategy,
            path: alignment.to_warp_path(),
            total_cost: alignment.total_cost,
            cost_per_step: alignment.cost_per_step(),
        }
    }
}

/// The four alignments of one comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignments {
    pub mfcc: StrategyAlignment,
    pub chroma: StrategyAlignment,
    pub mixed: StrategyAlignment,
    pub weighted: StrategyAlignment,
}

impl Alignments {
    pub fn get(&self, strategy: CostStrategy) -> &StrategyAlignment {
        match strategy {
            CostStrategy::Mfcc => &self.mfcc,
            CostStrategy::Chroma => &self.chroma,
            CostStrategy::Mixed => &self.mixed,
            CostStrategy::Weighted => &self.weighted,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StrategyAlignment> {
        [&self.mfcc, &self.chroma, &self.mixed, &self.weighted].into_iter()
    }
}

/// Everything produced by comparing two recordings. Built once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub files: [String; 2],
    pub features: [FeatureBundle; 2],
    pub alignments: Alignments,
}

impl AnalysisResult {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&Artifact::from(self))
            .map_err(|err| AnalysisError::Artifact(err.to_string()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let artifact: Artifact =
            serde_json::from_str(raw).map_err(|err| AnalysisError::Artifact(err.to_string()))?;
        Self::try_from(artifact)
    }
}

/// A value recorded once per input recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paired<T> {
    #[serde(rename = "fileA")]
    pub file_a: T,
    #[serde(rename = "fileB")]
    pub file_b: T,
}

impl<T> Paired<T> {
    fn from_bundles(bundles: &[FeatureBundle; 2], project: impl Fn(&FeatureBundle) -> T) -> Self {
        Self {
            file_a: project(&bundles[0]),
            file_b: project(&bundles[1]),
        }
    }
}

/// Per-descriptor feature table of the artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactFeatures {
    pub waveform: Paired<Vec<f32>>,
    pub sample_rate: Paired<u32>,
    pub duration: Paired<f32>,
    pub rms: Paired<Vec<f32>>,
    pub f0: Paired<Vec<f32>>,
    pub f0_framewise: Paired<Vec<f32>>,
    pub vibrato: Paired<Vec<f32>>,
    pub onset_times: Paired<Vec<f32>>,
    pub onset_strength: Paired<Vec<f32>>,
    pub spectral_centroid: Paired<Vec<f32>>,
    pub spectral_bandwidth: Paired<Vec<f32>>,
    pub mfcc: Paired<Vec<Vec<f32>>>,
    pub chroma: Paired<Vec<Vec<f32>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub dtw_mfcc: WarpPath,
    pub dtw_chroma: WarpPath,
    pub dtw_mixed: WarpPath,
    pub dtw_own: WarpPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total: f64,
    pub per_step: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactCosts {
    pub dtw_mfcc: CostSummary,
    pub dtw_chroma: CostSummary,
    pub dtw_mixed: CostSummary,
    pub dtw_own: CostSummary,
}

/// On-disk JSON layout of an [`AnalysisResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub files: [String; 2],
    pub features: ArtifactFeatures,
    pub dtw: ArtifactPaths,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtw_cost: Option<ArtifactCosts>,
}

impl From<&AnalysisResult> for Artifact {
    fn from(result: &AnalysisResult) -> Self {
        let bundles = &result.features;
        let alignments = &result.alignments;
        let summary = |alignment: &StrategyAlignment| CostSummary {
            total: alignment.total_cost,
            per_step: alignment.cost_per_step,
        };
        Self {
            files: result.files.clone(),
            features: ArtifactFeatures {
                waveform: Paired::from_bundles(bundles, |b| b.waveform.clone()),
                sample_rate: Paired::from_bundles(bundles, |b| b.sample_rate),
                duration: Paired::from_bundles(bundles, |b| b.duration),
                rms: Paired::from_bundles(bundles, |b| b.rms.to_vec()),
                f0: Paired::from_bundles(bundles, |b| b.f0.to_vec()),
                f0_framewise: Paired::from_bundles(bundles, |b| b.f0_framewise.to_vec()),
                vibrato: Paired::from_bundles(bundles, |b| b.vibrato.to_vec()),
                onset_times: Paired::from_bundles(bundles, |b| b.onset_times.clone()),
                onset_strength: Paired::from_bundles(bundles, |b| b.onset_strength.to_vec()),
                spectral_centroid: Paired::from_bundles(bundles, |b| b.spectral_centroid.to_vec()),
                spectral_bandwidth: Paired::from_bundles(bundles, |b| {
                    b.spectral_bandwidth.to_vec()
                }),
                mfcc: Paired::from_bundles(bundles, |b| matrix_to_rows(&b.mfcc)),
                chroma: Paired::from_bundles(bundles, |b| matrix_to_rows(&b.chroma)),
            },
            dtw: ArtifactPaths {
                dtw_mfcc: alignments.mfcc.path.clone(),
                dtw_chroma: alignments.chroma.path.clone(),
                dtw_mixed: alignments.mixed.path.clone(),
                dtw_own: alignments.weighted.path.clone(),
            },
            dtw_cost: Some(ArtifactCosts {
                dtw_mfcc: summary(&alignments.mfcc),
                dtw_chroma: summary(&alignments.chroma),
                dtw_mixed: summary(&alignments.mixed),
                dtw_own: summary(&alignments.weighted),
            }),
        }
    }
}

impl TryFrom<Artifact> for AnalysisResult {
    type Error = AnalysisError;

    fn try_from(artifact: Artifact) -> Result<Self> {
        let Artifact {
            files,
            features,
            dtw,
            dtw_cost,
        } = artifact;
        let bundle_a = rebuild_bundle(&features, Side::A)?;
        let bundle_b = rebuild_bundle(&features, Side::B)?;

        let costs = dtw_cost.as_ref();
        let alignment = |strategy: CostStrategy, path: WarpPath, cost: Option<&CostSummary>| {
            StrategyAlignment {
                strategy,
                path,
                total_cost: cost.map(|c| c.total).unwrap_or(0.0),
                cost_per_step: cost.map(|c| c.per_step).unwrap_or(0.0),
            }
        };
        let alignments = Alignments {
            mfcc: alignment(CostStrategy::Mfcc, dtw.dtw_mfcc, costs.map(|c| &c.dtw_mfcc)),
            chroma: alignment(
                CostStrategy::Chroma,
                dtw.dtw_chroma,
                costs.map(|c| &c.dtw_chroma),
            ),
            mixed: alignment(CostStrategy::Mixed, dtw.dtw_mixed, costs.map(|c| &c.dtw_mixed)),
            weighted: alignment(CostStrategy::Weighted, dtw.dtw_own, costs.map(|c| &c.dtw_own)),
        };
        Ok(Self {
            files,
            features: [bundle_a, bundle_b],
            alignments,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    A,
    B,
}

impl Side {
    fn pick<T: Clone>(self, paired: &Paired<T>) -> T {
        match self {
            Side::A => paired.file_a.clone(),
            Side::B => paired.file_b.clone(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Side::A => "fileA",
            Side::B => "fileB",
        }
    }
}

fn rebuild_bundle(features: &ArtifactFeatures, side: Side) -> Result<FeatureBundle> {
    let waveform = side.pick(&features.waveform);
    let frames = frame_count(waveform.len());
    let f0 = side.pick(&features.f0);
    let voiced = f0.iter().map(|v| *v > 0.0).collect();

    let bundle = FeatureBundle {
        sample_rate: side.pick(&features.sample_rate),
        frame_count: frames,
        rms: Array1::from(side.pick(&features.rms)),
        f0: Array1::from(f0),
        voiced,
        f0_framewise: Array1::from(side.pick(&features.f0_framewise)),
        vibrato: Array1::from(side.pick(&features.vibrato)),
        onset_times: side.pick(&features.onset_times),
        onset_strength: Array1::from(side.pick(&features.onset_strength)),
        spectral_centroid: Array1::from(side.pick(&features.spectral_centroid)),
        spectral_bandwidth: Array1::from(side.pick(&features.spectral_bandwidth)),
        mfcc: rows_to_matrix(side.pick(&features.mfcc), frames, "mfcc")?,
        chroma: rows_to_matrix(side.pick(&features.chroma), frames, "chroma")?,
        duration: side.pick(&features.duration),
        waveform,
    };
    if !bundle.is_consistent() {
        return Err(AnalysisError::Artifact(format!(
            "{} features disagree on frame count ({frames} frames expected)",
            side.label()
        )));
    }
    Ok(bundle)
}

fn matrix_to_rows(matrix: &Array2<f32>) -> Vec<Vec<f32>> {
    matrix.outer_iter().map(|row| row.to_vec()).collect()
}

fn rows_to_matrix(rows: Vec<Vec<f32>>, frames: usize, label: &str) -> Result<Array2<f32>> {
    let height = rows.len();
    if let Some((index, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != frames) {
        return Err(AnalysisError::Artifact(format!(
            "{label} row {index} has {} columns, expected {frames}",
            row.len()
        )));
    }
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((height, frames), flat)
        .map_err(|err| AnalysisError::Artifact(format!("{label}: {err}")))
}
