//! Convolution kernel figure

use super::{Colormap, FigureCell, FigureRenderer, FigureSpec};
use crate::error::{Error, Result};
use crate::nn::Model;
use ndarray::{s, Ix4};
use std::path::{Path, PathBuf};

/// Weight of the first downsampling convolution
pub const DOWNSAMPLE_KERNEL_PARAM: &str = "downsample_layers.0.0.weight";
/// File name of the kernel figure inside the output directory
pub const KERNEL_FIGURE_NAME: &str = "convolutional kernels in downsample 0.png";

/// Draw every `[kh, kw]` kernel of the first downsampling convolution
///
/// Kernels are laid out with one row per output channel and one column per
/// input channel, each normalized independently. Returns `Ok(None)` when the
/// model has no such parameter.
pub fn render_kernels(
    model: &dyn Model,
    renderer: &mut dyn FigureRenderer,
    output_dir: &Path,
) -> Result<Option<PathBuf>> {
    let Some(param) = model.named_parameter(DOWNSAMPLE_KERNEL_PARAM) else {
        return Ok(None);
    };
    let weight = param
        .data()
        .view()
        .into_dimensionality::<Ix4>()
        .map_err(|_| Error::shape(&[0, 0, 0, 0], param.shape()))?;
    let (out_channels, in_channels, kh, kw) = weight.dim();

    let cell_size = (kh.max(kw) as u32 * 8).max(16);
    let mut spec = FigureSpec::new(out_channels, in_channels, output_dir.join(KERNEL_FIGURE_NAME))
        .with_cell_size(cell_size)
        .with_colormap(Colormap::Viridis);
    for o in 0..out_channels {
        for i in 0..in_channels {
            spec.cells[o * in_channels + i] = Some(FigureCell {
                image: None,
                overlay: Some(weight.slice(s![o, i, .., ..]).to_owned()),
            });
        }
    }

    let path = renderer.render(&spec)?;
    tracing::info!(path = %path.display(), "saved convolution kernels");
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::LinearClassifier;
    use crate::visual::PngGridRenderer;

    #[test]
    fn test_model_without_kernels_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let model = LinearClassifier::new(4, 2, 0);
        let written = render_kernels(&model, &mut PngGridRenderer, dir.path()).unwrap();
        assert!(written.is_none());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
