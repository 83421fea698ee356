//! Pairwise frame dissimilarity between two recordings.

use std::fmt::{Display, Formatter};

use ndarray::{concatenate, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::analysis::features::FeatureBundle;
use crate::analysis::{AnalysisError, Result};

/// `frames_a x frames_b` matrix of non-negative dissimilarities.
pub type CostMatrix = Array2<f32>;

const EPSILON: f32 = 1e-8;
const SILENCE_TO_SILENCE: f32 = 0.1;
const SILENCE_TO_SOUND: f32 = 2.0;

/// Notion of frame similarity used to build a cost matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostStrategy {
    /// Euclidean distance between MFCC vectors.
    Mfcc,
    /// Cosine distance between chroma vectors.
    Chroma,
    /// Cosine distance between stacked chroma + MFCC vectors.
    Mixed,
    /// Weighted MFCC + chroma + f0 distance with a silence-alignment bias.
    Weighted,
}

impl CostStrategy {
    pub const ALL: [CostStrategy; 4] = [
        CostStrategy::Mfcc,
        CostStrategy::Chroma,
        CostStrategy::Mixed,
        CostStrategy::Weighted,
    ];

    /// Key under which the strategy's path is stored in an analysis artifact.
    pub fn artifact_key(self) -> &'static str {
        match self {
            CostStrategy::Mfcc => "dtw_mfcc",
            CostStrategy::Chroma => "dtw_chroma",
            CostStrategy::Mixed => "dtw_mixed",
            CostStrategy::Weighted => "dtw_own",
        }
    }
}

impl Display for CostStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CostStrategy::Mfcc => "mfcc",
            CostStrategy::Chroma => "chroma",
            CostStrategy::Mixed => "mixed",
            CostStrategy::Weighted => "weighted",
        };
        f.write_str(name)
    }
}

/// Per-block scale factors for the weighted strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureWeights {
    pub mfcc: f32,
    pub chroma: f32,
    pub f0: f32,
}

impl Default for FeatureWeights {
    fn default() -> Self {
        Self {
            mfcc: 0.2,
            chroma: 0.1,
            f0: 1.0,
        }
    }
}

/// Tuning for [`weighted_cost`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedCostSettings {
    pub weights: FeatureWeights,
    pub energy_threshold: f32,
}

impl Default for WeightedCostSettings {
    fn default() -> Self {
        Self {
            weights: FeatureWeights::default(),
            energy_threshold: 0.5,
        }
    }
}

/// Builds the cost matrix for `strategy`.
pub fn build_cost_matrix(
    strategy: CostStrategy,
    a: &FeatureBundle,
    b: &FeatureBundle,
    settings: &WeightedCostSettings,
) -> Result<CostMatrix> {
    if a.frame_count == 0 || b.frame_count == 0 {
        return Err(AnalysisError::DegenerateMatrix(format!(
            "cannot compare {} frames against {} frames",
            a.frame_count, b.frame_count
        )));
    }
    let cost = match strategy {
        CostStrategy::Mfcc => mfcc_cost(a, b),
        CostStrategy::Chroma => chroma_cost(a, b),
        CostStrategy::Mixed => mixed_cost(a, b),
        CostStrategy::Weighted => weighted_cost(a, b, settings),
    };
    Ok(cost)
}

pub fn mfcc_cost(a: &FeatureBundle, b: &FeatureBundle) -> CostMatrix {
    pairwise(a.mfcc.view(), b.mfcc.view(), euclidean)
}

pub fn chroma_cost(a: &FeatureBundle, b: &FeatureBundle) -> CostMatrix {
    pairwise(a.chroma.view(), b.chroma.view(), cosine)
}

pub fn mixed_cost(a: &FeatureBundle, b: &FeatureBundle) -> CostMatrix {
    let stacked_a = stack_rows(&[a.chroma.view(), a.mfcc.view()]);
    let stacked_b = stack_rows(&[b.chroma.view(), b.mfcc.view()]);
    pairwise(stacked_a.view(), stacked_b.view(), cosine)
}

/// Weighted base distance scaled by the silence-agreement weights.
pub fn weighted_cost(
    a: &FeatureBundle,
    b: &FeatureBundle,
    settings: &WeightedCostSettings,
) -> CostMatrix {
    let base = weighted_base_distance(a, b, &settings.weights);
    let silent_a = silence_mask(&a.rms, settings.energy_threshold);
    let silent_b = silence_mask(&b.rms, settings.energy_threshold);
    base * silence_weights(&silent_a, &silent_b)
}

/// Euclidean distance between the stacked weighted blocks, before silence weighting.
pub fn weighted_base_distance(
    a: &FeatureBundle,
    b: &FeatureBundle,
    weights: &FeatureWeights,
) -> CostMatrix {
    let blocks_a = WeightedBlocks::from_bundle(a, weights);
    let blocks_b = WeightedBlocks::from_bundle(b, weights);
    pairwise(blocks_a.stacked().view(), blocks_b.stacked().view(), euclidean)
}

/// One recording's feature blocks, each z-scored per row and scaled by its weight.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedBlocks {
    pub mfcc: Array2<f32>,
    pub chroma: Array2<f32>,
    pub f0: Array1<f32>,
}

impl WeightedBlocks {
    pub fn from_bundle(bundle: &FeatureBundle, weights: &FeatureWeights) -> Self {
        let mut mfcc = zscore_rows(&bundle.mfcc);
        mfcc *= weights.mfcc;
        let mut chroma = zscore_rows(&bundle.chroma);
        chroma *= weights.chroma;
        let mut f0 = zscore(bundle.f0.view());
        f0 *= weights.f0;
        Self { mfcc, chroma, f0 }
    }

    pub fn frame_count(&self) -> usize {
        self.f0.len()
    }

    /// Blocks stacked into one `(dims x frames)` matrix: MFCC, chroma, then f0.
    pub fn stacked(&self) -> Array2<f32> {
        let f0_row = self.f0.view().insert_axis(Axis(0));
        stack_rows(&[self.mfcc.view(), self.chroma.view(), f0_row])
    }
}

/// `true` where the frame's max-normalised RMS falls below `threshold`.
pub fn silence_mask(rms: &Array1<f32>, threshold: f32) -> Vec<bool> {
    let peak = rms.iter().copied().fold(0.0_f32, f32::max);
    rms.iter()
        .map(|value| value / (peak + EPSILON) < threshold)
        .collect()
}

/// Multiplicative weights: cheap silence-to-silence, penalised silence-to-sound.
pub fn silence_weights(silent_a: &[bool], silent_b: &[bool]) -> Array2<f32> {
    Array2::from_shape_fn((silent_a.len(), silent_b.len()), |(i, j)| {
        match (silent_a[i], silent_b[j]) {
            (true, true) => SILENCE_TO_SILENCE,
            (true, false) | (false, true) => SILENCE_TO_SOUND,
            (false, false) => 1.0,
        }
    })
}

fn pairwise<F>(a: ArrayView2<f32>, b: ArrayView2<f32>, metric: F) -> CostMatrix
where
    F: Fn(ArrayView1<f32>, ArrayView1<f32>) -> f32,
{
    let columns_b: Vec<ArrayView1<f32>> = b.axis_iter(Axis(1)).collect();
    let mut cost = Array2::zeros((a.ncols(), b.ncols()));
    for (i, column_a) in a.axis_iter(Axis(1)).enumerate() {
        for (j, column_b) in columns_b.iter().enumerate() {
            cost[(i, j)] = metric(column_a, column_b.view());
        }
    }
    cost
}

pub(crate) fn euclidean(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// `1 - cos(a, b)`, clamped to `[0, 2]`. Two zero vectors are identical, one zero
/// vector is orthogonal to everything.
pub(crate) fn cosine(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    match (norm_a > EPSILON, norm_b > EPSILON) {
        (false, false) => 0.0,
        (true, false) | (false, true) => 1.0,
        (true, true) => (1.0 - a.dot(&b) / (norm_a * norm_b)).clamp(0.0, 2.0),
    }
}

fn stack_rows(blocks: &[ArrayView2<f32>]) -> Array2<f32> {
    let frames = blocks.iter().map(|block| block.ncols()).min().unwrap_or(0);
    let trimmed: Vec<ArrayView2<f32>> = blocks
        .iter()
        .map(|block| block.slice(ndarray::s![.., ..frames]))
        .collect();
    concatenate(Axis(0), &trimmed).unwrap_or_else(|_| Array2::zeros((0, frames)))
}

fn zscore_rows(input: &Array2<f32>) -> Array2<f32> {
    let mut output = input.clone();
    for mut row in output.outer_iter_mut() {
        let normalised = zscore(row.view());
        row.assign(&normalised);
    }
    output
}

fn zscore(values: ArrayView1<f32>) -> Array1<f32> {
    if values.is_empty() {
        return Array1::zeros(0);
    }
    let mean = values.mean().unwrap_or(0.0);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / values.len() as f32;
    let std_dev = variance.sqrt();
    values.mapv(|v| (v - mean) / (std_dev + EPSILON))
}
