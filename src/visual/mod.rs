//! Attention-map and kernel visualization
//!
//! During evaluation the local-attention tensors captured by the model are
//! reduced to one strength per spatial cell, reshaped into a square map,
//! upsampled and drawn over the original (unnormalized) images.

mod attention;
mod kernels;
mod render;

pub use attention::{attention_grid, attention_strengths, upsample};
pub use kernels::{render_kernels, DOWNSAMPLE_KERNEL_PARAM, KERNEL_FIGURE_NAME};
pub use render::{Colormap, FigureCell, FigureRenderer, FigureSpec, PngGridRenderer};

use crate::capture::ActivationCapture;
use crate::data::{ImageDataset, Targets};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Visualization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
    /// Overlay transparency
    pub alpha: f32,
    /// Smallest batch that gets a figure
    pub min_batch: usize,
    /// Figure is `grid × grid` cells
    pub grid: usize,
    /// Cell edge in pixels
    pub cell_size: u32,
    /// Attention map upsampling factor
    pub upsample: usize,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: PathBuf::from("out/visual"),
            alpha: 0.2,
            min_batch: 100,
            grid: 10,
            cell_size: 42,
            upsample: 3,
        }
    }
}

impl VisualConfig {
    /// `{output_dir}/figure and attn {batch_num} alpha {alpha}.png`
    pub fn figure_path(&self, batch_num: usize) -> PathBuf {
        self.output_dir
            .join(format!("figure and attn {batch_num} alpha {}.png", self.alpha))
    }

    pub fn kernel_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Build the attention figure for one evaluation batch
///
/// The first `grid²` samples are considered; a sample's cell is drawn only
/// when the original dataset's label at global index
/// `batch_size * batch_num + i` matches the batch target at `i`.
pub fn attention_figure(
    capture: &ActivationCapture,
    dataset: &dyn ImageDataset,
    targets: &Targets,
    batch_num: usize,
    config: &VisualConfig,
) -> Result<FigureSpec> {
    let labels = targets.as_hard().ok_or_else(|| {
        Error::InvalidParameter("attention figures need hard evaluation labels".into())
    })?;
    let strengths = attention_strengths(capture)?;
    let batch_size = strengths.nrows();

    let mut spec = FigureSpec::new(config.grid, config.grid, config.figure_path(batch_num))
        .with_cell_size(config.cell_size)
        .with_alpha(config.alpha)
        .with_colormap(Colormap::Rainbow);

    let cells = (config.grid * config.grid).min(batch_size).min(labels.len());
    for i in 0..cells {
        let (image, label) = dataset.get(batch_size * batch_num + i)?;
        if label != labels[i] {
            continue;
        }
        let grid = attention_grid(strengths.row(i))?;
        spec.cells[i] = Some(FigureCell {
            image: Some(image),
            overlay: Some(upsample(&grid, config.upsample)),
        });
    }
    Ok(spec)
}
