//! Region-attention instrumentation for any image model

use super::{BackwardOptions, ForwardContext, Model, ModelOutput, OutputGrad, Parameter};
use crate::capture::{
    LOCAL_ATTENTION_WEIGHT, LOCAL_IMAGES, LOCAL_ROUTING_INDEX, LOCAL_ROUTING_WEIGHT,
};
use crate::error::{Error, Result};
use ndarray::{s, Array2, Array3, Array4, ArrayD, Axis, Ix4};

/// Wraps a model and records local-attention tensors while capturing
///
/// The image is split into `regions × regions` cells. Each cell's mean
/// intensity acts as both query and key; the recorded attention weight is the
/// gaussian affinity `exp(-(q_i - k_j)² / var)` over the sample's cell
/// means, with one head and a window of one query per cell, so downstream
/// reductions yield one strength per cell. Nothing is computed unless the
/// forward context is capturing.
#[derive(Debug, Clone)]
pub struct AttentionProbe<M> {
    inner: M,
    regions: usize,
}

impl<M: Model> AttentionProbe<M> {
    pub fn new(inner: M, regions: usize) -> Self {
        Self {
            inner,
            regions: regions.max(1),
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn into_inner(self) -> M {
        self.inner
    }

    /// Per-sample cell means, `[batch, regions²]`
    fn cell_means(&self, images: &Array4<f32>) -> Result<Array2<f32>> {
        let (batch, _, height, width) = images.dim();
        let r = self.regions;
        if height % r != 0 || width % r != 0 {
            return Err(Error::InvalidParameter(format!(
                "{height}x{width} image does not split into {r}x{r} regions"
            )));
        }
        let (ch, cw) = (height / r, width / r);
        Ok(Array2::from_shape_fn((batch, r * r), |(b, cell)| {
            let (y, x) = ((cell / r) * ch, (cell % r) * cw);
            images
                .slice(s![b, .., y..y + ch, x..x + cw])
                .mean()
                .unwrap_or(0.0)
        }))
    }

    fn record(&self, inputs: &ArrayD<f32>, ctx: &mut ForwardContext) -> Result<()> {
        let images = inputs
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| Error::shape(&[0, 0, 0, 0], inputs.shape()))?
            .to_owned();
        let means = self.cell_means(&images)?;
        let (batch, cells) = means.dim();
        let var = means.var_axis(Axis(1), 0.0).mapv(|v| v.max(f32::EPSILON));

        let weight = Array3::from_shape_fn((batch, cells, 1), |(b, c, _)| means[[b, c]]);
        let index = Array3::from_shape_fn((batch, cells, 1), |(_, c, _)| c as f32);
        let attn = Array4::from_shape_fn((batch * cells, 1, 1, cells), |(row, _, _, k)| {
            let (b, q) = (row / cells, row % cells);
            let d = means[[b, q]] - means[[b, k]];
            (-d * d / var[b]).exp()
        });

        ctx.record(LOCAL_IMAGES, || images.into_dyn());
        ctx.record(LOCAL_ROUTING_WEIGHT, || weight.into_dyn());
        ctx.record(LOCAL_ROUTING_INDEX, || index.into_dyn());
        ctx.record(LOCAL_ATTENTION_WEIGHT, || attn.into_dyn());
        Ok(())
    }
}

impl<M: Model> Model for AttentionProbe<M> {
    fn forward(&mut self, inputs: &ArrayD<f32>, ctx: &mut ForwardContext) -> Result<ModelOutput> {
        if ctx.is_capturing() {
            self.record(inputs, ctx)?;
        }
        self.inner.forward(inputs, ctx)
    }

    fn backward(&mut self, grad: &OutputGrad, options: BackwardOptions) -> Result<()> {
        self.inner.backward(grad, options)
    }

    fn parameters(&self) -> &[Parameter] {
        self.inner.parameters()
    }

    fn parameters_mut(&mut self) -> &mut [Parameter] {
        self.inner.parameters_mut()
    }

    fn set_training(&mut self, training: bool) {
        self.inner.set_training(training);
    }

    fn is_training(&self) -> bool {
        self.inner.is_training()
    }
}
