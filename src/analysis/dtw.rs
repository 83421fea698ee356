use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::analysis::cost::CostMatrix;
use crate::analysis::frames::frame_to_sample;
use crate::analysis::{AnalysisError, Result};

/// One matched pair of sample positions, `x` in recording A and `y` in recording B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarpStep {
    pub x: usize,
    pub y: usize,
}

/// Monotonic correspondence between the two recordings, in sample units.
pub type WarpPath = Vec<WarpStep>;

/// Alignment outcome produced by the DTW solver, in frame units.
#[derive(Debug, Clone, PartialEq)]
pub struct DtwAlignment {
    pub frames: Vec<(usize, usize)>,
    pub total_cost: f64,
}

impl DtwAlignment {
    pub fn cost_per_step(&self) -> f64 {
        if self.frames.is_empty() {
            return 0.0;
        }
        self.total_cost / self.frames.len() as f64
    }

    /// Frame pairs converted to sample indices via the hop length.
    pub fn to_warp_path(&self) -> WarpPath {
        self.frames
            .iter()
            .map(|&(i, j)| WarpStep {
                x: frame_to_sample(i),
                y: frame_to_sample(j),
            })
            .collect()
    }
}

/// Minimum-cost monotonic alignment through `cost`, from `(0, 0)` to the last cell.
pub fn align(cost: &CostMatrix) -> Result<DtwAlignment> {
    let (rows, cols) = cost.dim();
    if rows == 0 || cols == 0 {
        return Err(AnalysisError::DegenerateMatrix(format!(
            "cost matrix has shape {rows}x{cols}"
        )));
    }
    let accumulated = accumulate(cost);
    let frames = backtrack(&accumulated);
    Ok(DtwAlignment {
        frames,
        total_cost: accumulated[(rows - 1, cols - 1)],
    })
}

fn accumulate(cost: &CostMatrix) -> Array2<f64> {
    let (rows, cols) = cost.dim();
    let mut acc = Array2::from_elem((rows, cols), f64::INFINITY);
    for i in 0..rows {
        for j in 0..cols {
            let local = cost[(i, j)] as f64;
            let best_previous = if i == 0 && j == 0 {
                0.0
            } else {
                let diagonal = lookup(&acc, i.checked_sub(1), j.checked_sub(1));
                let up = lookup(&acc, i.checked_sub(1), Some(j));
                let left = lookup(&acc, Some(i), j.checked_sub(1));
                diagonal.min(up).min(left)
            };
            acc[(i, j)] = local + best_previous;
        }
    }
    acc
}

fn lookup(acc: &Array2<f64>, i: Option<usize>, j: Option<usize>) -> f64 {
    match (i, j) {
        (Some(i), Some(j)) => acc[(i, j)],
        _ => f64::INFINITY,
    }
}

/// Walks back from the final cell; ties prefer diagonal, then row, then column.
fn backtrack(acc: &Array2<f64>) -> Vec<(usize, usize)> {
    let (rows, cols) = acc.dim();
    let (mut i, mut j) = (rows - 1, cols - 1);
    let mut path = Vec::with_capacity(rows + cols);
    path.push((i, j));
    while i > 0 || j > 0 {
        let diagonal = lookup(acc, i.checked_sub(1), j.checked_sub(1));
        let up = lookup(acc, i.checked_sub(1), Some(j));
        let left = lookup(acc, Some(i), j.checked_sub(1));
        if diagonal <= up && diagonal <= left {
            i -= 1;
            j -= 1;
        } else if up <= left {
            i -= 1;
        } else {
            j -= 1;
        }
        path.push((i, j));
    }
    path.reverse();
    path
}
