//! Grid figures rendered to PNG

use crate::error::{Error, Result};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::{Array2, Array3};
use std::fs;
use std::path::{Path, PathBuf};

/// Colour map for scalar overlays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Colormap {
    #[default]
    Rainbow,
    Viridis,
}

const VIRIDIS: [[f32; 3]; 5] = [
    [68.0, 1.0, 84.0],
    [59.0, 82.0, 139.0],
    [33.0, 145.0, 140.0],
    [94.0, 201.0, 98.0],
    [253.0, 231.0, 37.0],
];

impl Colormap {
    /// RGB in `[0, 1]` for `t` in `[0, 1]`
    pub fn map(&self, t: f32) -> [f32; 3] {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        match self {
            Colormap::Rainbow => [
                (2.0 * t - 1.0).abs(),
                (std::f32::consts::PI * t).sin(),
                (std::f32::consts::FRAC_PI_2 * t).cos(),
            ],
            Colormap::Viridis => {
                let pos = t * (VIRIDIS.len() - 1) as f32;
                let lo = (pos.floor() as usize).min(VIRIDIS.len() - 2);
                let frac = pos - lo as f32;
                let mut rgb = [0.0; 3];
                for (c, out) in rgb.iter_mut().enumerate() {
                    *out = (VIRIDIS[lo][c] * (1.0 - frac) + VIRIDIS[lo + 1][c] * frac) / 255.0;
                }
                rgb
            }
        }
    }
}

/// One populated cell of a figure
#[derive(Debug, Clone, Default)]
pub struct FigureCell {
    /// CHW image in `[0, 1]`; one or three channels
    pub image: Option<Array3<f32>>,
    /// Scalar map drawn over the image, min-max normalized per cell
    pub overlay: Option<Array2<f32>>,
}

/// A `rows × cols` grid figure; `None` cells stay blank
#[derive(Debug, Clone)]
pub struct FigureSpec {
    pub rows: usize,
    pub cols: usize,
    pub cell_size: u32,
    pub alpha: f32,
    pub colormap: Colormap,
    pub cells: Vec<Option<FigureCell>>,
    pub path: PathBuf,
}

impl FigureSpec {
    pub fn new(rows: usize, cols: usize, path: impl Into<PathBuf>) -> Self {
        Self {
            rows,
            cols,
            cell_size: 42,
            alpha: 1.0,
            colormap: Colormap::default(),
            cells: vec![None; rows * cols],
            path: path.into(),
        }
    }

    pub fn with_cell_size(mut self, cell_size: u32) -> Self {
        self.cell_size = cell_size.max(1);
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.alpha = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn with_colormap(mut self, colormap: Colormap) -> Self {
        self.colormap = colormap;
        self
    }

    /// Number of non-blank cells
    pub fn populated(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }
}

/// Turns a [`FigureSpec`] into a saved figure
pub trait FigureRenderer {
    /// Render and persist the figure, returning where it was written
    fn render(&mut self, spec: &FigureSpec) -> Result<PathBuf>;
}

/// Composes the grid into one RGB PNG with the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct PngGridRenderer;

impl PngGridRenderer {
    fn to_rgb(image: &Array3<f32>) -> Result<RgbImage> {
        let (channels, height, width) = image.dim();
        if channels != 1 && channels != 3 {
            return Err(Error::Render(format!(
                "expected 1 or 3 channels, got {channels}"
            )));
        }
        let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Ok(RgbImage::from_fn(width as u32, height as u32, |x, y| {
            let (x, y) = (x as usize, y as usize);
            if channels == 1 {
                let v = to_u8(image[[0, y, x]]);
                Rgb([v, v, v])
            } else {
                Rgb([
                    to_u8(image[[0, y, x]]),
                    to_u8(image[[1, y, x]]),
                    to_u8(image[[2, y, x]]),
                ])
            }
        }))
    }

    fn normalized(overlay: &Array2<f32>) -> Array2<f32> {
        let lo = overlay.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = overlay.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range = hi - lo;
        if !range.is_finite() || range <= f32::EPSILON {
            return Array2::zeros(overlay.dim());
        }
        overlay.mapv(|v| (v - lo) / range)
    }

    fn draw_cell(canvas: &mut RgbImage, spec: &FigureSpec, cell: &FigureCell, x0: u32, y0: u32) -> Result<()> {
        let size = spec.cell_size;
        let base = match &cell.image {
            Some(image) => imageops::resize(&Self::to_rgb(image)?, size, size, FilterType::Triangle),
            None => RgbImage::from_pixel(size, size, Rgb([255, 255, 255])),
        };
        let overlay = cell.overlay.as_ref().map(Self::normalized);

        for (x, y, pixel) in base.enumerate_pixels() {
            let mut rgb = pixel.0.map(|c| c as f32 / 255.0);
            if let Some(map) = &overlay {
                let (h, w) = map.dim();
                if h > 0 && w > 0 {
                    let sy = (y as usize * h) / size as usize;
                    let sx = (x as usize * w) / size as usize;
                    let color = spec.colormap.map(map[[sy, sx]]);
                    for (c, out) in rgb.iter_mut().enumerate() {
                        *out = *out * (1.0 - spec.alpha) + color[c] * spec.alpha;
                    }
                }
            }
            let px = rgb.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
            canvas.put_pixel(x0 + x, y0 + y, Rgb(px));
        }
        Ok(())
    }
}

impl FigureRenderer for PngGridRenderer {
    fn render(&mut self, spec: &FigureSpec) -> Result<PathBuf> {
        if spec.cells.len() > spec.rows * spec.cols {
            return Err(Error::Render(format!(
                "{} cells do not fit a {}x{} grid",
                spec.cells.len(),
                spec.rows,
                spec.cols
            )));
        }
        let size = spec.cell_size;
        let mut canvas = RgbImage::from_pixel(
            spec.cols as u32 * size,
            spec.rows as u32 * size,
            Rgb([255, 255, 255]),
        );
        for (i, cell) in spec.cells.iter().enumerate() {
            if let Some(cell) = cell {
                let x0 = (i % spec.cols) as u32 * size;
                let y0 = (i / spec.cols) as u32 * size;
                Self::draw_cell(&mut canvas, spec, cell, x0, y0)?;
            }
        }

        ensure_parent(&spec.path)?;
        canvas
            .save(&spec.path)
            .map_err(|e| Error::Render(format!("{}: {e}", spec.path.display())))?;
        Ok(spec.path.clone())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
