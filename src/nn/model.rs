//! Model abstraction driven by the training and evaluation loops

use super::Parameter;
use crate::capture::ActivationCapture;
use crate::precision::Precision;
use crate::Result;
use ndarray::{Array2, ArrayD};

/// Outputs of one forward pass
///
/// Distilled models return both the class head and the distillation head while
/// training; in eval mode they fold the two heads into `logits`.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub logits: Array2<f32>,
    pub dist_logits: Option<Array2<f32>>,
}

impl ModelOutput {
    pub fn new(logits: Array2<f32>) -> Self {
        Self {
            logits,
            dist_logits: None,
        }
    }

    pub fn with_dist(logits: Array2<f32>, dist_logits: Array2<f32>) -> Self {
        Self {
            logits,
            dist_logits: Some(dist_logits),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.logits.nrows()
    }

    pub fn num_classes(&self) -> usize {
        self.logits.ncols()
    }

    /// Round every head to the autocast precision
    pub fn cast(&mut self, precision: Precision) {
        precision.cast_array(&mut self.logits);
        if let Some(dist) = self.dist_logits.as_mut() {
            precision.cast_array(dist);
        }
    }
}

/// Gradient of the loss with respect to each output head
#[derive(Debug, Clone)]
pub struct OutputGrad {
    pub logits: Array2<f32>,
    /// `None` when the distillation head does not contribute to the loss
    pub dist_logits: Option<Array2<f32>>,
}

impl OutputGrad {
    /// Multiply every head gradient by `factor`
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            logits: &self.logits * factor,
            dist_logits: self.dist_logits.as_ref().map(|g| g * factor),
        }
    }
}

/// Options for the backward pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackwardOptions {
    /// Keep the graph for higher-order derivatives
    pub create_graph: bool,
}

/// Per-call forward context
///
/// Carries the autocast precision and, when requested, the activation capture
/// for this single pass.
#[derive(Debug)]
pub struct ForwardContext {
    precision: Precision,
    capture: Option<ActivationCapture>,
}

impl ForwardContext {
    pub fn new(precision: Precision) -> Self {
        Self {
            precision,
            capture: None,
        }
    }

    /// Enable activation capture for this pass
    pub fn capturing(precision: Precision) -> Self {
        Self {
            precision,
            capture: Some(ActivationCapture::new()),
        }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Record an intermediate tensor; ignored unless capturing
    pub fn record(&mut self, name: &str, tensor: impl FnOnce() -> ArrayD<f32>) {
        if let Some(capture) = self.capture.as_mut() {
            capture.insert(name, tensor());
        }
    }

    /// Activations recorded so far in this pass
    pub fn capture(&self) -> Option<&ActivationCapture> {
        self.capture.as_ref()
    }

    /// Hand the activations captured during this pass back to the caller
    pub fn into_capture(self) -> ActivationCapture {
        self.capture.unwrap_or_default()
    }
}

/// A trainable model
pub trait Model {
    /// Run the forward pass
    fn forward(&mut self, inputs: &ArrayD<f32>, ctx: &mut ForwardContext) -> Result<ModelOutput>;

    /// Backpropagate `grad` and accumulate parameter gradients
    fn backward(&mut self, grad: &OutputGrad, options: BackwardOptions) -> Result<()>;

    fn parameters(&self) -> &[Parameter];

    fn parameters_mut(&mut self) -> &mut [Parameter];

    /// Switch normalization/dropout behaviour between train and eval
    fn set_training(&mut self, training: bool);

    fn is_training(&self) -> bool;

    /// Find a parameter by qualified name
    fn named_parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters().iter().find(|p| p.name() == name)
    }
}
