//! Linear classifier with an optional distillation head

use super::{BackwardOptions, ForwardContext, Model, ModelOutput, OutputGrad, Parameter};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2, ArrayD, ArrayView1, ArrayView2, Axis, Ix1, Ix2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const HEAD_WEIGHT: usize = 0;
const HEAD_BIAS: usize = 1;
const DIST_WEIGHT: usize = 2;
const DIST_BIAS: usize = 3;

/// Flatten-then-linear classifier
///
/// Inputs of any rank are flattened to `[batch, in_features]`. With
/// [`with_distillation_head`](Self::with_distillation_head) the model exposes a
/// second head trained against the teacher, DeiT style.
///
/// # Example
///
/// ```
/// use destilar::nn::{ForwardContext, LinearClassifier, Model};
/// use destilar::precision::Precision;
/// use ndarray::ArrayD;
///
/// let mut model = LinearClassifier::new(12, 4, 0);
/// let inputs = ArrayD::zeros(vec![2, 3, 2, 2]);
/// let mut ctx = ForwardContext::new(Precision::Fp32);
/// let out = model.forward(&inputs, &mut ctx).unwrap();
/// assert_eq!(out.logits.shape(), &[2, 4]);
/// ```
pub struct LinearClassifier {
    in_features: usize,
    num_classes: usize,
    params: Vec<Parameter>,
    training: bool,
    cached_inputs: Option<Array2<f32>>,
}

impl LinearClassifier {
    /// Create a classifier with seeded uniform initialization
    pub fn new(in_features: usize, num_classes: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let params = vec![
            Self::init_weight("head.weight", in_features, num_classes, &mut rng),
            Parameter::zeros("head.bias", &[num_classes]),
        ];
        Self {
            in_features,
            num_classes,
            params,
            training: true,
            cached_inputs: None,
        }
    }

    /// Add a distillation head
    pub fn with_distillation_head(mut self, seed: u64) -> Self {
        if self.has_distillation_head() {
            return self;
        }
        let mut rng = StdRng::seed_from_u64(seed);
        self.params.push(Self::init_weight(
            "head_dist.weight",
            self.in_features,
            self.num_classes,
            &mut rng,
        ));
        self.params
            .push(Parameter::zeros("head_dist.bias", &[self.num_classes]));
        self
    }

    fn init_weight(name: &str, in_features: usize, out: usize, rng: &mut StdRng) -> Parameter {
        let bound = 1.0 / (in_features.max(1) as f32).sqrt();
        let data = ArrayD::from_shape_fn(vec![out, in_features], |_| {
            rng.random_range(-bound..bound)
        });
        Parameter::new(name, data)
    }

    pub fn has_distillation_head(&self) -> bool {
        self.params.len() > DIST_WEIGHT
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn matrix(&self, index: usize) -> Result<ArrayView2<'_, f32>> {
        let p = &self.params[index];
        p.data()
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| Error::shape(&[self.num_classes, self.in_features], p.shape()))
    }

    fn vector(&self, index: usize) -> Result<ArrayView1<'_, f32>> {
        let p = &self.params[index];
        p.data()
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|_| Error::shape(&[self.num_classes], p.shape()))
    }

    fn head(&self, x: &ArrayView2<'_, f32>, weight: usize, bias: usize) -> Result<Array2<f32>> {
        Ok(x.dot(&self.matrix(weight)?.t()) + &self.vector(bias)?)
    }

    fn flatten(&self, inputs: &ArrayD<f32>) -> Result<Array2<f32>> {
        let n = inputs.shape().first().copied().unwrap_or(0);
        if n == 0 || inputs.len() != n * self.in_features {
            return Err(Error::shape(&[n, self.in_features], inputs.shape()));
        }
        inputs
            .to_shape((n, self.in_features))
            .map(|v| v.to_owned())
            .map_err(|_| Error::shape(&[n, self.in_features], inputs.shape()))
    }

    fn accumulate(&mut self, grad: &Array2<f32>, x: &Array2<f32>, weight: usize, bias: usize) -> Result<()> {
        let d_weight = grad.t().dot(x).into_dyn();
        let d_bias: Array1<f32> = grad.sum_axis(Axis(0));
        self.params[weight].accumulate_grad(d_weight)?;
        self.params[bias].accumulate_grad(d_bias.into_dyn())
    }
}

impl Model for LinearClassifier {
    fn forward(&mut self, inputs: &ArrayD<f32>, ctx: &mut ForwardContext) -> Result<ModelOutput> {
        let mut x = self.flatten(inputs)?;
        ctx.precision().cast_array(&mut x);
        ctx.record("LinearClassifier.features", || x.clone().into_dyn());

        let view = x.view();
        let logits = self.head(&view, HEAD_WEIGHT, HEAD_BIAS)?;
        let output = if self.has_distillation_head() {
            let dist = self.head(&view, DIST_WEIGHT, DIST_BIAS)?;
            if self.training {
                ModelOutput::with_dist(logits, dist)
            } else {
                ModelOutput::new((logits + dist) * 0.5)
            }
        } else {
            ModelOutput::new(logits)
        };

        self.cached_inputs = if self.training { Some(x) } else { None };
        Ok(output)
    }

    /// The linear model keeps no graph, so `create_graph` has no effect.
    fn backward(&mut self, grad: &OutputGrad, _options: BackwardOptions) -> Result<()> {
        let x = self.cached_inputs.take().ok_or_else(|| {
            Error::Backward("backward called without a training-mode forward pass".into())
        })?;
        if grad.logits.nrows() != x.nrows() {
            return Err(Error::shape(
                &[x.nrows(), self.num_classes],
                grad.logits.shape(),
            ));
        }

        self.accumulate(&grad.logits, &x, HEAD_WEIGHT, HEAD_BIAS)?;
        if let Some(dist_grad) = grad.dist_logits.as_ref() {
            if !self.has_distillation_head() {
                return Err(Error::Backward(
                    "distillation gradient given to a model without a distillation head".into(),
                ));
            }
            self.accumulate(dist_grad, &x, DIST_WEIGHT, DIST_BIAS)?;
        }
        Ok(())
    }

    fn parameters(&self) -> &[Parameter] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Parameter] {
        &mut self.params
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
        if !training {
            self.cached_inputs = None;
        }
    }

    fn is_training(&self) -> bool {
        self.training
    }
}
