//! One epoch of training

use crate::data::{BatchMixer, DataLoader, ImageDataset};
use crate::device::Device;
use crate::dist::{all_reduce_mean, Collective};
use crate::distill::Criterion;
use crate::ema::ModelEma;
use crate::error::{Error, Result};
use crate::metrics::{epoch_1000x, MetricLogger, ProgressLogger, ScalarSink, SmoothedValue};
use crate::nn::{ForwardContext, Model};
use crate::optim::Optimizer;
use crate::precision::{LossScaler, Precision};
use std::collections::BTreeMap;
use tracing::{debug, error, info};

/// Settings for [`train_one_epoch`]
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOptions {
    /// Epoch index; only used for logging
    pub epoch: usize,
    pub clip_grad: Option<f32>,
    pub print_freq: usize,
    pub precision: Precision,
    /// Put normalization/dropout layers in training mode
    pub set_training_mode: bool,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epoch: 0,
            clip_grad: None,
            print_freq: 10,
            precision: Precision::default(),
            set_training_mode: true,
        }
    }
}

impl TrainOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_epoch(mut self, epoch: usize) -> Self {
        self.epoch = epoch;
        self
    }

    pub fn with_clip_grad(mut self, clip_grad: Option<f32>) -> Self {
        self.clip_grad = clip_grad;
        self
    }

    pub fn with_print_freq(mut self, print_freq: usize) -> Self {
        self.print_freq = print_freq;
        self
    }

    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_training_mode(mut self, set_training_mode: bool) -> Self {
        self.set_training_mode = set_training_mode;
        self
    }
}

/// Advance `model` over one epoch of `loader` and return the averaged meters
///
/// Each step transfers the batch, applies `mixer`, runs the forward pass at
/// the configured precision, guards against a non-finite loss, performs one
/// scaled optimizer step, fences the device and then updates `ema`. The
/// batch loss is all-reduced on every step so all workers issue the same
/// collectives; `sink` receives `loss` and `lr` at the fractional-epoch
/// coordinate from [`epoch_1000x`].
///
/// # Errors
///
/// [`Error::NonFiniteLoss`] stops the epoch before the optimizer step of the
/// offending batch. Collaborator errors propagate unchanged.
#[allow(clippy::too_many_arguments)]
pub fn train_one_epoch<D: ImageDataset + ?Sized>(
    model: &mut dyn Model,
    criterion: &mut dyn Criterion,
    loader: &DataLoader<'_, D>,
    optimizer: &mut dyn Optimizer,
    scaler: &mut dyn LossScaler,
    device: &mut dyn Device,
    collective: &dyn Collective,
    mut ema: Option<&mut ModelEma>,
    mut mixer: Option<&mut dyn BatchMixer>,
    mut sink: Option<&mut dyn ScalarSink>,
    options: &TrainOptions,
) -> Result<BTreeMap<String, f64>> {
    model.set_training(options.set_training_mode);

    let mut metric_logger = MetricLogger::default();
    metric_logger.add_meter("lr", SmoothedValue::with_format(1, "{value:.6}"));
    let num_batches = loader.len();
    let mut progress = ProgressLogger::new(
        format!("Epoch: [{}]", options.epoch),
        num_batches,
        options.print_freq,
    );

    if let Some(dir) = sink.as_deref().and_then(|s| s.log_dir()) {
        info!("log_dir: {}", dir.display());
    }

    // create_graph only for optimizers that consume curvature
    let create_graph = optimizer.as_second_order().is_some();

    for (step, batch) in loader.iter().enumerate() {
        progress.data_ready();
        let batch = device.transfer(batch?)?;
        let batch = match mixer.as_deref_mut() {
            Some(mixer) => mixer.mix(batch)?,
            None => batch,
        };
        let batch_size = batch.len();

        let mut ctx = ForwardContext::new(options.precision);
        let mut outputs = model.forward(&batch.inputs, &mut ctx)?;
        outputs.cast(options.precision);
        let loss = criterion.forward(&batch.inputs, &outputs, &batch.targets)?;

        let loss_value = loss.value;
        if !loss_value.is_finite() {
            error!(epoch = options.epoch, step, "Loss is {}, stopping training", loss_value);
            eprintln!("Loss is {loss_value}, stopping training");
            return Err(Error::NonFiniteLoss {
                value: loss_value,
                epoch: options.epoch,
                step,
            });
        }

        optimizer.zero_grad(model.parameters_mut());
        let report = scaler.backward_and_step(
            &loss.grad,
            model,
            optimizer,
            options.clip_grad,
            create_graph,
        )?;
        if report.skipped {
            debug!(step, scale = report.scale, "optimizer step skipped on overflow");
        }

        device.synchronize()?;
        if let Some(ema) = ema.as_deref_mut() {
            ema.update(model)?;
        }

        let lr = optimizer.lr() as f64;
        metric_logger.update_weighted("loss", loss_value as f64, batch_size as u64);
        metric_logger.update("lr", lr);

        let loss_value_reduce = all_reduce_mean(collective, loss_value as f64)?;
        if let Some(sink) = sink.as_deref_mut() {
            let x = epoch_1000x(step, num_batches, options.epoch);
            sink.add_scalar("loss", loss_value_reduce, x)?;
            sink.add_scalar("lr", lr, x)?;
        }

        progress.step_done(step, &metric_logger, device);
    }
    progress.finish();

    metric_logger.synchronize(collective)?;
    println!("Averaged stats: {metric_logger}");
    if let Some(sink) = sink {
        sink.flush()?;
    }
    Ok(metric_logger.global_averages())
}
