//! Teacher models queried by the distillation loss

use crate::error::Result;
use crate::nn::{ForwardContext, Model};
use crate::precision::Precision;
use ndarray::{Array2, ArrayD};

/// Source of teacher logits
pub trait Teacher {
    /// Class logits for `inputs`, `[batch, classes]`; no gradients flow back
    fn predict(&mut self, inputs: &ArrayD<f32>) -> Result<Array2<f32>>;
}

/// A model kept in eval mode and only ever used for inference
pub struct FrozenTeacher<M: Model> {
    model: M,
    precision: Precision,
}

impl<M: Model> FrozenTeacher<M> {
    pub fn new(mut model: M) -> Self {
        model.set_training(false);
        Self {
            model,
            precision: Precision::Fp32,
        }
    }

    /// Run the teacher under the given autocast precision
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_inner(self) -> M {
        self.model
    }
}

impl<M: Model> Teacher for FrozenTeacher<M> {
    fn predict(&mut self, inputs: &ArrayD<f32>) -> Result<Array2<f32>> {
        let mut ctx = ForwardContext::new(self.precision);
        Ok(self.model.forward(inputs, &mut ctx)?.logits)
    }
}
