//! One evaluation pass with optional attention figures

use crate::data::{DataLoader, ImageDataset};
use crate::device::Device;
use crate::dist::Collective;
use crate::distill::BaseCriterion;
use crate::error::{Error, Result};
use crate::metrics::{accuracy, MetricLogger, ProgressLogger};
use crate::nn::{ForwardContext, Model};
use crate::precision::Precision;
use crate::visual::{attention_figure, render_kernels, FigureRenderer, VisualConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Settings for [`evaluate`]
#[derive(Debug, Clone, PartialEq)]
pub struct EvalOptions {
    pub precision: Precision,
    pub print_freq: usize,
    pub visual: VisualConfig,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            precision: Precision::default(),
            print_freq: 10,
            visual: VisualConfig::default(),
        }
    }
}

impl EvalOptions {
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_print_freq(mut self, print_freq: usize) -> Self {
        self.print_freq = print_freq;
        self
    }

    pub fn with_visual(mut self, visual: VisualConfig) -> Self {
        self.visual = visual;
        self
    }

    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.visual.output_dir = output_dir.into();
        self
    }

    pub fn with_alpha(mut self, alpha: f32) -> Self {
        self.visual.alpha = alpha;
        self
    }

    pub fn with_min_batch(mut self, min_batch: usize) -> Self {
        self.visual.min_batch = min_batch;
        self
    }
}

/// Evaluate `model` over `loader` and return `loss`, `acc1` and `acc5`
///
/// When `original` is given, the convolution kernels are rendered once at
/// entry and every batch of at least `visual.min_batch` samples produces an
/// attention figure from the activations captured during that batch's
/// forward pass. Images are fetched from `original` by global index
/// `batch_size * batch_num + i`, where `batch_num` counts rendered batches,
/// so a sharded or shuffled `loader` is rejected when `original` is given.
pub fn evaluate<D: ImageDataset + ?Sized>(
    loader: &DataLoader<'_, D>,
    model: &mut dyn Model,
    device: &mut dyn Device,
    collective: &dyn Collective,
    original: Option<&dyn ImageDataset>,
    renderer: &mut dyn FigureRenderer,
    options: &EvalOptions,
) -> Result<BTreeMap<String, f64>> {
    let criterion = BaseCriterion::CrossEntropy;
    let mut metric_logger = MetricLogger::default();
    let mut progress = ProgressLogger::new("Test:", loader.len(), options.print_freq);
    let visual = &options.visual;

    if original.is_some() && !loader.is_sequential() {
        return Err(Error::InvalidParameter(
            "attention figures need an unsharded, unshuffled evaluation loader".into(),
        ));
    }
    if original.is_some() {
        render_kernels(model, renderer, &visual.output_dir)?;
    }
    model.set_training(false);

    let mut batch_num = 0;
    for (step, batch) in loader.iter().enumerate() {
        progress.data_ready();
        let batch = device.transfer(batch?)?;
        let batch_size = batch.len();

        let mut ctx = if original.is_some() {
            ForwardContext::capturing(options.precision)
        } else {
            ForwardContext::new(options.precision)
        };
        let mut output = model.forward(&batch.inputs, &mut ctx)?;
        output.cast(options.precision);
        let capture = ctx.into_capture();

        if let Some(dataset) = original.filter(|_| batch_size >= visual.min_batch) {
            let figure = attention_figure(&capture, dataset, &batch.targets, batch_num, visual)?;
            let path = renderer.render(&figure)?;
            info!(
                batch = batch_num,
                cells = figure.populated(),
                "attention figure saved to {}",
                path.display()
            );
            batch_num += 1;
        }

        let labels = batch.targets.as_hard().ok_or_else(|| {
            Error::InvalidParameter("evaluation needs hard labels".into())
        })?;
        let loss = criterion.loss(&output.logits, &batch.targets)?;
        let acc = accuracy(&output.logits, labels, &[1, 5])?;

        metric_logger.update("loss", loss.value as f64);
        metric_logger.update_weighted("acc1", acc[0], batch_size as u64);
        metric_logger.update_weighted("acc5", acc[1], batch_size as u64);

        progress.step_done(step, &metric_logger, device);
    }
    progress.finish();

    metric_logger.synchronize(collective)?;
    let averages = metric_logger.global_averages();
    let stat = |name: &str| averages.get(name).copied().unwrap_or(0.0);
    println!(
        "* Acc@1 {:.3} Acc@5 {:.3} loss {:.3}",
        stat("acc1"),
        stat("acc5"),
        stat("loss")
    );
    Ok(averages)
}
