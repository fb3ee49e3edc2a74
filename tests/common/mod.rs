//! Shared fakes for the driver integration tests

#![allow(dead_code)]

use destilar::data::{InMemoryDataset, SyntheticConfig, Targets};
use destilar::device::Device;
use destilar::distill::{Criterion, LossOutput};
use destilar::nn::{
    AttentionProbe, BackwardOptions, ForwardContext, LinearClassifier, Model, ModelOutput,
    OutputGrad, Parameter,
};
use destilar::optim::{Optimizer, ParamGroup, SecondOrder};
use destilar::visual::{FigureRenderer, FigureSpec, DOWNSAMPLE_KERNEL_PARAM};
use destilar::Result;
use ndarray::{Array2, ArrayD, IxDyn};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

pub type EventLog = Rc<RefCell<Vec<&'static str>>>;

pub fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Seeded blob dataset of `samples` CHW images `[3, size, size]`
pub fn dataset(samples: usize, num_classes: usize, image_size: usize) -> InMemoryDataset {
    InMemoryDataset::synthetic(&SyntheticConfig {
        num_classes,
        samples,
        image_size,
        ..SyntheticConfig::default()
    })
    .unwrap()
}

pub fn classifier(image_size: usize, num_classes: usize) -> LinearClassifier {
    LinearClassifier::new(3 * image_size * image_size, num_classes, 11)
}

/// Classifier that records local-attention tensors over a 2x2 region grid
pub fn probed_classifier(image_size: usize, num_classes: usize) -> AttentionProbe<LinearClassifier> {
    AttentionProbe::new(classifier(image_size, num_classes), 2)
}

/// Wraps a model and records how the loop drives it
pub struct Recorder<M> {
    inner: M,
    log: EventLog,
    pub forwards: usize,
    pub capturing_forwards: usize,
    /// Forward calls whose context already held activations on entry
    pub stale_captures: usize,
    pub create_graph: Vec<bool>,
}

impl<M: Model> Recorder<M> {
    pub fn new(inner: M, log: EventLog) -> Self {
        Self {
            inner,
            log,
            forwards: 0,
            capturing_forwards: 0,
            stale_captures: 0,
            create_graph: Vec::new(),
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<M: Model> Model for Recorder<M> {
    fn forward(&mut self, inputs: &ArrayD<f32>, ctx: &mut ForwardContext) -> Result<ModelOutput> {
        self.log.borrow_mut().push("forward");
        self.forwards += 1;
        if let Some(capture) = ctx.capture() {
            self.capturing_forwards += 1;
            if !capture.is_empty() {
                self.stale_captures += 1;
            }
        }
        self.inner.forward(inputs, ctx)
    }

    fn backward(&mut self, grad: &OutputGrad, options: BackwardOptions) -> Result<()> {
        self.log.borrow_mut().push("backward");
        self.create_graph.push(options.create_graph);
        self.inner.backward(grad, options)
    }

    fn parameters(&self) -> &[Parameter] {
        self.log.borrow_mut().push("parameters");
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

/// Device whose fences and transfers are logged
pub struct RecordingDevice {
    log: EventLog,
    pub transfers: usize,
    pub fences: usize,
}

impl RecordingDevice {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            transfers: 0,
            fences: 0,
        }
    }
}

impl Device for RecordingDevice {
    fn name(&self) -> &str {
        "recording"
    }

    fn transfer(&mut self, batch: destilar::data::Batch) -> Result<destilar::data::Batch> {
        self.log.borrow_mut().push("transfer");
        self.transfers += 1;
        Ok(batch)
    }

    fn synchronize(&mut self) -> Result<()> {
        self.log.borrow_mut().push("synchronize");
        self.fences += 1;
        Ok(())
    }

    fn max_memory_allocated(&self) -> Option<u64> {
        Some(64 * 1024 * 1024)
    }
}

/// Optimizer wrapper that decays its rate after every step
pub struct RecordingOptimizer<O> {
    inner: O,
    log: EventLog,
    lr_decay: f32,
    second_order: bool,
    pub steps: usize,
    /// First-group rate right after each step
    pub lr_after_step: Vec<f32>,
}

impl<O: Optimizer> RecordingOptimizer<O> {
    pub fn new(inner: O, log: EventLog) -> Self {
        Self {
            inner,
            log,
            lr_decay: 1.0,
            second_order: false,
            steps: 0,
            lr_after_step: Vec::new(),
        }
    }

    pub fn with_lr_decay(mut self, lr_decay: f32) -> Self {
        self.lr_decay = lr_decay;
        self
    }

    pub fn with_second_order(mut self) -> Self {
        self.second_order = true;
        self
    }
}

impl<O: Optimizer> SecondOrder for RecordingOptimizer<O> {
    fn hessian_power(&self) -> f32 {
        1.0
    }
}

impl<O: Optimizer> Optimizer for RecordingOptimizer<O> {
    fn step(&mut self, params: &mut [Parameter]) {
        self.log.borrow_mut().push("step");
        self.inner.step(params);
        self.steps += 1;
        let lr = self.inner.lr() * self.lr_decay;
        self.inner.set_lr(lr);
        self.lr_after_step.push(lr);
    }

    fn zero_grad(&mut self, params: &mut [Parameter]) {
        self.log.borrow_mut().push("zero_grad");
        self.inner.zero_grad(params);
    }

    fn param_groups(&self) -> &[ParamGroup] {
        self.inner.param_groups()
    }

    fn param_groups_mut(&mut self) -> &mut [ParamGroup] {
        self.inner.param_groups_mut()
    }

    fn as_second_order(&self) -> Option<&dyn SecondOrder> {
        if self.second_order {
            Some(self)
        } else {
            None
        }
    }
}

/// Criterion returning a fixed sequence of loss values with zero gradient
pub struct ScriptedCriterion {
    losses: Vec<f32>,
    pub calls: usize,
}

impl ScriptedCriterion {
    pub fn new(losses: Vec<f32>) -> Self {
        Self { losses, calls: 0 }
    }
}

impl Criterion for ScriptedCriterion {
    fn forward(
        &mut self,
        _inputs: &ArrayD<f32>,
        outputs: &ModelOutput,
        targets: &Targets,
    ) -> Result<LossOutput> {
        assert_eq!(outputs.batch_size(), targets.len());
        let value = self.losses[self.calls % self.losses.len()];
        self.calls += 1;
        Ok(LossOutput {
            value,
            grad: OutputGrad {
                logits: Array2::zeros(outputs.logits.dim()),
                dist_logits: None,
            },
        })
    }
}

/// Renderer that keeps every figure instead of writing it
#[derive(Default)]
pub struct RecordingRenderer {
    pub figures: Vec<FigureSpec>,
}

impl FigureRenderer for RecordingRenderer {
    fn render(&mut self, spec: &FigureSpec) -> Result<PathBuf> {
        self.figures.push(spec.clone());
        Ok(spec.path.clone())
    }
}

/// Model with a first downsampling convolution and constant logits
pub struct KernelModel {
    params: Vec<Parameter>,
    num_classes: usize,
    training: bool,
}

impl KernelModel {
    pub fn new(out_channels: usize, in_channels: usize, num_classes: usize) -> Self {
        let kernel = ArrayD::from_shape_fn(IxDyn(&[out_channels, in_channels, 3, 3]), |idx| {
            (idx[0] * 7 + idx[1] * 5 + idx[2] * 3 + idx[3]) as f32
        });
        Self {
            params: vec![Parameter::new(DOWNSAMPLE_KERNEL_PARAM, kernel)],
            num_classes,
            training: true,
        }
    }
}

impl Model for KernelModel {
    fn forward(&mut self, inputs: &ArrayD<f32>, _ctx: &mut ForwardContext) -> Result<ModelOutput> {
        let batch = inputs.shape()[0];
        let logits = Array2::from_shape_fn((batch, self.num_classes), |(_, c)| c as f32);
        Ok(ModelOutput::new(logits))
    }

    fn backward(&mut self, _grad: &OutputGrad, _options: BackwardOptions) -> Result<()> {
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
    }

    fn is_training(&self) -> bool {
        self.training
    }
}
