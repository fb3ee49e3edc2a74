//! Exponential moving average of model parameters
//!
//! The shadow copy is maintained for external consumers (evaluation,
//! checkpointing); the training loop only ever writes to it.

use crate::error::{Error, Result};
use crate::nn::Model;
use ndarray::ArrayD;

/// Decayed running copy of a model's parameters
///
/// # Example
///
/// ```
/// use destilar::ema::ModelEma;
/// use destilar::nn::{LinearClassifier, Model};
///
/// let model = LinearClassifier::new(4, 2, 0);
/// let ema = ModelEma::new(&model, 0.999);
/// assert_eq!(ema.params()[0], *model.parameters()[0].data());
/// ```
#[derive(Debug, Clone)]
pub struct ModelEma {
    decay: f32,
    params: Vec<ArrayD<f32>>,
    num_updates: usize,
}

impl ModelEma {
    /// Initialize the shadow parameters from the model
    ///
    /// # Panics
    ///
    /// Panics if decay is not in [0, 1]
    pub fn new(model: &dyn Model, decay: f32) -> Self {
        assert!(
            (0.0..=1.0).contains(&decay),
            "EMA decay must be in [0, 1], got {}",
            decay
        );
        Self {
            decay,
            params: model.parameters().iter().map(|p| p.data().clone()).collect(),
            num_updates: 0,
        }
    }

    /// `ema = decay * ema + (1 - decay) * live` for every parameter
    pub fn update(&mut self, model: &dyn Model) -> Result<()> {
        let live = model.parameters();
        if live.len() != self.params.len() {
            return Err(Error::shape(&[self.params.len()], &[live.len()]));
        }

        let decay = self.decay;
        for (shadow, param) in self.params.iter_mut().zip(live) {
            if shadow.shape() != param.shape() {
                return Err(Error::shape(shadow.shape(), param.shape()));
            }
            shadow.zip_mut_with(param.data(), |e, &m| *e = decay * *e + (1.0 - decay) * m);
        }
        self.num_updates += 1;
        Ok(())
    }

    pub fn params(&self) -> &[ArrayD<f32>] {
        &self.params
    }

    pub fn decay(&self) -> f32 {
        self.decay
    }

    pub fn num_updates(&self) -> usize {
        self.num_updates
    }

    /// Overwrite the model parameters with the shadow values
    pub fn copy_to(&self, model: &mut dyn Model) -> Result<()> {
        let live = model.parameters_mut();
        if live.len() != self.params.len() {
            return Err(Error::shape(&[self.params.len()], &[live.len()]));
        }
        for (shadow, param) in self.params.iter().zip(live.iter_mut()) {
            if shadow.shape() != param.shape() {
                return Err(Error::shape(shadow.shape(), param.shape()));
            }
            param.data_mut().assign(shadow);
        }
        Ok(())
    }
}
