//! Named parameter tensor with gradient storage

use crate::error::{Error, Result};
use ndarray::{ArrayD, IxDyn};

/// Model parameter with an accumulated gradient
#[derive(Clone)]
pub struct Parameter {
    name: String,
    data: ArrayD<f32>,
    grad: Option<ArrayD<f32>>,
    requires_grad: bool,
}

impl Parameter {
    /// Create a new trainable parameter
    pub fn new(name: impl Into<String>, data: ArrayD<f32>) -> Self {
        Self {
            name: name.into(),
            data,
            grad: None,
            requires_grad: true,
        }
    }

    /// Create a parameter filled with zeros
    pub fn zeros(name: impl Into<String>, shape: &[usize]) -> Self {
        Self::new(name, ArrayD::zeros(IxDyn(shape)))
    }

    /// Mark the parameter as frozen
    pub fn frozen(mut self) -> Self {
        self.requires_grad = false;
        self
    }

    /// Qualified parameter name (e.g. `head.weight`)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut ArrayD<f32> {
        &mut self.data
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Get gradient (if computed)
    pub fn grad(&self) -> Option<&ArrayD<f32>> {
        self.grad.as_ref()
    }

    pub fn grad_mut(&mut self) -> Option<&mut ArrayD<f32>> {
        self.grad.as_mut()
    }

    /// Accumulate gradient (for when the parameter is used multiple times)
    pub fn accumulate_grad(&mut self, grad: ArrayD<f32>) -> Result<()> {
        if !self.requires_grad {
            return Ok(());
        }
        if grad.shape() != self.data.shape() {
            return Err(Error::shape(self.data.shape(), grad.shape()));
        }
        match self.grad.as_mut() {
            Some(existing) => *existing += &grad,
            None => self.grad = Some(grad),
        }
        Ok(())
    }

    /// Zero out gradient
    pub fn zero_grad(&mut self) {
        self.grad = None;
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("shape", &self.data.shape())
            .field("has_grad", &self.grad.is_some())
            .field("requires_grad", &self.requires_grad)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_grad_sums() {
        let mut p = Parameter::zeros("w", &[2]);
        p.accumulate_grad(ArrayD::from_elem(IxDyn(&[2]), 1.0)).unwrap();
        p.accumulate_grad(ArrayD::from_elem(IxDyn(&[2]), 2.0)).unwrap();
        assert_eq!(p.grad().unwrap().as_slice().unwrap(), &[3.0, 3.0]);

        p.zero_grad();
        assert!(p.grad().is_none());
    }

    #[test]
    fn test_accumulate_grad_shape_mismatch() {
        let mut p = Parameter::zeros("w", &[2, 2]);
        let err = p.accumulate_grad(ArrayD::zeros(IxDyn(&[4]))).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_frozen_ignores_grad() {
        let mut p = Parameter::zeros("w", &[3]).frozen();
        p.accumulate_grad(ArrayD::ones(IxDyn(&[3]))).unwrap();
        assert!(p.grad().is_none());
        assert!(!p.requires_grad());
    }
}
