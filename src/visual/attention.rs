//! Attention extraction and reshaping

use crate::capture::{
    ActivationCapture, LOCAL_ATTENTION_WEIGHT, LOCAL_IMAGES, LOCAL_ROUTING_INDEX,
    LOCAL_ROUTING_WEIGHT,
};
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1, Axis, Ix4};

/// One attention strength per spatial cell per sample, `[batch, regions * window]`
///
/// Reads the four local-attention tensors from `capture`. The attention weight
/// `[batch * regions, heads, window, kv]` is averaged over heads, regrouped
/// per sample as `[batch, regions * window, rest]` and averaged over `rest`.
/// The batch size comes from the captured image patches and the region count
/// from the routing weights.
pub fn attention_strengths(capture: &ActivationCapture) -> Result<Array2<f32>> {
    let images = capture.get(LOCAL_IMAGES)?;
    let r_weight = capture.get(LOCAL_ROUTING_WEIGHT)?;
    capture.get(LOCAL_ROUTING_INDEX)?;
    let attn = capture.get(LOCAL_ATTENTION_WEIGHT)?;

    let batch = images.shape().first().copied().unwrap_or(0);
    let regions = r_weight.shape().get(1).copied().unwrap_or(0);
    let attn = attn
        .view()
        .into_dimensionality::<Ix4>()
        .map_err(|_| Error::shape(&[batch * regions, 0, 0, 0], attn.shape()))?;
    let window = attn.shape()[2];

    let head_mean = attn
        .mean_axis(Axis(1))
        .ok_or_else(|| Error::shape(&[batch * regions, 1, window, 0], attn.shape()))?;

    let rows = batch * regions * window;
    if rows == 0 || head_mean.len() % rows != 0 {
        return Err(Error::shape(&[batch, regions * window, 0], head_mean.shape()));
    }
    let rest = head_mean.len() / rows;
    let grouped = head_mean
        .to_shape((batch, regions * window, rest))
        .map_err(|_| Error::shape(&[batch, regions * window, rest], head_mean.shape()))?;

    grouped
        .mean_axis(Axis(2))
        .ok_or_else(|| Error::shape(&[batch, regions * window, 1], grouped.shape()))
}

/// Reshape one sample's strengths into a square grid
pub fn attention_grid(row: ArrayView1<'_, f32>) -> Result<Array2<f32>> {
    let side = (row.len() as f64).sqrt() as usize;
    if side * side != row.len() {
        return Err(Error::shape(&[side * side], &[row.len()]));
    }
    row.to_owned()
        .into_shape_with_order((side, side))
        .map_err(|_| Error::shape(&[side, side], &[row.len()]))
}

/// Repeat every element `factor` times along both axes
pub fn upsample(grid: &Array2<f32>, factor: usize) -> Array2<f32> {
    let factor = factor.max(1);
    let (h, w) = grid.dim();
    Array2::from_shape_fn((h * factor, w * factor), |(y, x)| grid[[y / factor, x / factor]])
}
