//! Single-command training from YAML configuration

use super::schema::{EngineConfig, OptimizerKind, TrainSection};
use super::validate::validate_config;
use crate::data::{BatchMixer, DataLoader, ImageDataset, InMemoryDataset, Mixup, Normalize};
use crate::device::Cpu;
use crate::dist::{Collective, LocalGroup, SingleProcess};
use crate::distill::{BaseCriterion, DistillationKind, DistillationLoss, FrozenTeacher, Teacher};
use crate::ema::ModelEma;
use crate::engine::{evaluate, train_one_epoch, EvalOptions, TrainOptions};
use crate::error::{Error, Result};
use crate::metrics::{format_duration, JsonlScalarWriter, ScalarSink};
use crate::nn::{AttentionProbe, LinearClassifier, Model};
use crate::optim::{param_groups_weight_decay, AdamW, LRScheduler, Optimizer, WarmupCosine, SGD};
use crate::precision::GradScaler;
use crate::visual::PngGridRenderer;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Metrics of one epoch on the main worker
#[derive(Debug, Clone, PartialEq)]
pub struct EpochStats {
    pub epoch: usize,
    pub train: BTreeMap<String, f64>,
    pub eval: BTreeMap<String, f64>,
}

/// Outcome of [`run`]
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub epochs: Vec<EpochStats>,
    /// Best top-1 evaluation accuracy, percent
    pub max_accuracy: f64,
    /// EMA updates applied, when `model_ema` is on
    pub ema_updates: Option<usize>,
}

/// Load and validate a run configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(config_path: P) -> Result<EngineConfig> {
    let yaml_content = fs::read_to_string(config_path.as_ref()).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {}",
            config_path.as_ref().display(),
            e
        ))
    })?;

    let config: EngineConfig = serde_yaml::from_str(&yaml_content)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))?;

    validate_config(&config).map_err(|e| Error::ConfigError(format!("Invalid config: {e}")))?;

    Ok(config)
}

/// Load a YAML file and [`run`] it
///
/// # Example
///
/// ```no_run
/// use destilar::config::run_from_yaml;
///
/// let summary = run_from_yaml("config.yaml")?;
/// println!("Max accuracy: {:.2}%", summary.max_accuracy);
/// # Ok::<(), destilar::Error>(())
/// ```
pub fn run_from_yaml<P: AsRef<Path>>(config_path: P) -> Result<RunSummary> {
    run(&load_config(config_path)?)
}

/// Train and evaluate on the synthetic dataset described by `config`
///
/// With `world_size > 1` every worker runs on its own thread over its shard
/// and the workers reduce metrics through a [`LocalGroup`]. A worker that
/// fails aborts the group so its peers return instead of blocking; the
/// first non-collective error is reported.
pub fn run(config: &EngineConfig) -> Result<RunSummary> {
    validate_config(config).map_err(|e| Error::ConfigError(format!("Invalid config: {e}")))?;
    let train_set = InMemoryDataset::synthetic(&config.data.train_dataset())?;
    let eval_set = InMemoryDataset::synthetic(&config.data.eval_dataset())?;
    let start = Instant::now();

    let summary = if config.world_size == 1 {
        run_worker(config, &train_set, &eval_set, &SingleProcess)?
    } else {
        let handles = LocalGroup::new(config.world_size)?;
        let results: Vec<Result<RunSummary>> = std::thread::scope(|s| {
            let joins: Vec<_> = handles
                .iter()
                .map(|handle| {
                    let (train_set, eval_set) = (&train_set, &eval_set);
                    s.spawn(move || {
                        let result = run_worker(config, train_set, eval_set, handle);
                        if let Err(e) = &result {
                            handle.abort(&e.to_string());
                        }
                        result
                    })
                })
                .collect();
            joins
                .into_iter()
                .enumerate()
                .map(|(rank, join)| {
                    join.join()
                        .unwrap_or_else(|_| Err(Error::Collective(format!("worker {rank} panicked"))))
                })
                .collect()
        });
        first_failure(results)?
    };

    println!("Training time {}", format_duration(start.elapsed()));
    Ok(summary)
}

/// Rank 0's summary, or the root-cause error among the workers
fn first_failure(results: Vec<Result<RunSummary>>) -> Result<RunSummary> {
    let mut summaries = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(summary) => summaries.push(summary),
            Err(e) => errors.push(e),
        }
    }
    if !errors.is_empty() {
        let root = errors
            .iter()
            .position(|e| !matches!(e, Error::Collective(_)))
            .unwrap_or(0);
        return Err(errors.swap_remove(root));
    }
    summaries
        .into_iter()
        .next()
        .ok_or_else(|| Error::Collective("no workers ran".into()))
}

fn build_optimizer(train: &TrainSection, model: &dyn Model) -> Box<dyn Optimizer> {
    let groups = param_groups_weight_decay(model.parameters(), train.lr, train.weight_decay, &[]);
    match train.optimizer {
        OptimizerKind::Sgd => Box::new(SGD::with_groups(groups, train.momentum)),
        OptimizerKind::AdamW => Box::new(AdamW::with_groups(groups, 0.9, 0.999, 1e-8)),
    }
}

/// Largest region count up to 4 that tiles the image
fn probe_regions(image_size: usize) -> usize {
    (1..=4).rev().find(|r| image_size % r == 0).unwrap_or(1)
}

fn normalize(channels: usize) -> Option<Normalize> {
    (channels == 3).then(Normalize::imagenet)
}

fn loader<'a>(
    dataset: &'a InMemoryDataset,
    batch_size: usize,
    (rank, world_size): (usize, usize),
    shuffle: Option<u64>,
    channels: usize,
) -> Result<DataLoader<'a, InMemoryDataset>> {
    let mut loader = DataLoader::new(dataset, batch_size)?.with_shard(rank, world_size)?;
    if let Some(seed) = shuffle {
        loader = loader.with_shuffle(seed).with_drop_last(true);
    }
    if let Some(normalize) = normalize(channels) {
        loader = loader.with_normalize(normalize);
    }
    Ok(loader)
}

/// Fit a plain classifier to serve as the distillation teacher
fn fit_teacher(
    config: &EngineConfig,
    loader: &DataLoader<'_, InMemoryDataset>,
    collective: &dyn Collective,
) -> Result<Box<dyn Teacher>> {
    let data = &config.data;
    let mut teacher = LinearClassifier::new(
        data.input_features(),
        data.num_classes,
        data.seed.wrapping_add(7),
    );
    let mut criterion = DistillationLoss::base_only(BaseCriterion::CrossEntropy);
    let mut optimizer = build_optimizer(&config.train, &teacher);
    let mut scaler = GradScaler::for_precision(config.train.precision);
    for epoch in 0..config.distillation.teacher_epochs {
        let options = TrainOptions::new()
            .with_epoch(epoch)
            .with_precision(config.train.precision)
            .with_print_freq(config.train.print_freq);
        train_one_epoch(
            &mut teacher,
            &mut criterion,
            loader,
            optimizer.as_mut(),
            &mut scaler,
            &mut Cpu,
            collective,
            None,
            None,
            None,
            &options,
        )?;
    }
    Ok(Box::new(
        FrozenTeacher::new(teacher).with_precision(config.train.precision),
    ))
}

fn run_worker(
    config: &EngineConfig,
    train_set: &InMemoryDataset,
    eval_set: &InMemoryDataset,
    collective: &dyn Collective,
) -> Result<RunSummary> {
    let train = &config.train;
    let data = &config.data;
    let rank = collective.rank();
    let main_process = collective.is_main_process();
    let shard = (rank, collective.world_size());

    let mut train_loader = loader(
        train_set,
        data.batch_size,
        shard,
        Some(data.seed),
        data.channels,
    )?;
    // figures index originals by batch position, so every rank evaluates the
    // whole set in order and the reduced metrics are unchanged
    let eval_shard = if config.visual.enabled { (0, 1) } else { shard };
    let eval_loader = loader(eval_set, data.eval_batch_size, eval_shard, None, data.channels)?;

    let kind = config.distillation.kind;
    let mut classifier = LinearClassifier::new(data.input_features(), data.num_classes, data.seed);
    if kind != DistillationKind::None {
        classifier = classifier.with_distillation_head(data.seed.wrapping_add(1));
    }
    let mut model = AttentionProbe::new(classifier, probe_regions(data.image_size));

    let mixing = config.mixup.is_active();
    let base = BaseCriterion::for_training(mixing, train.smoothing);
    let mut criterion = if kind == DistillationKind::None {
        DistillationLoss::base_only(base)
    } else {
        info!(%kind, "fitting distillation teacher");
        let teacher = fit_teacher(config, &train_loader, collective)?;
        DistillationLoss::new(
            base,
            Some(teacher),
            kind,
            config.distillation.alpha,
            config.distillation.tau,
        )?
    };

    let mut optimizer = build_optimizer(train, &model);
    let scheduler = WarmupCosine::new(train.lr, train.min_lr, train.epochs)
        .with_warmup(train.warmup_lr, train.warmup_epochs);
    let mut scaler = GradScaler::for_precision(train.precision);
    let mut ema = train
        .model_ema
        .then(|| ModelEma::new(&model, train.model_ema_decay));
    let mut mixup = if mixing {
        Some(Mixup::new(config.mixup.clone(), data.seed.wrapping_add(rank as u64))?)
    } else {
        None
    };
    let mut sink = match (&train.log_dir, main_process) {
        (Some(dir), true) => Some(JsonlScalarWriter::create(dir)?),
        _ => None,
    };

    let visual_set = (config.visual.enabled && main_process).then_some(eval_set);
    let eval_options = EvalOptions::default()
        .with_precision(train.precision)
        .with_print_freq(train.print_freq)
        .with_visual(config.visual.clone());
    let mut renderer = PngGridRenderer;

    let mut summary = RunSummary {
        epochs: Vec::with_capacity(train.epochs),
        max_accuracy: 0.0,
        ema_updates: None,
    };
    for epoch in 0..train.epochs {
        train_loader.set_epoch(epoch as u64);
        scheduler.apply(optimizer.as_mut(), epoch);

        let options = TrainOptions::new()
            .with_epoch(epoch)
            .with_clip_grad(train.clip_grad)
            .with_print_freq(train.print_freq)
            .with_precision(train.precision)
            .with_training_mode(train.set_training_mode);
        let train_stats = train_one_epoch(
            &mut model,
            &mut criterion,
            &train_loader,
            optimizer.as_mut(),
            &mut scaler,
            &mut Cpu,
            collective,
            ema.as_mut(),
            mixup.as_mut().map(|m| m as &mut dyn BatchMixer),
            sink.as_mut().map(|s| s as &mut dyn ScalarSink),
            &options,
        )?;

        let eval_stats = evaluate(
            &eval_loader,
            &mut model,
            &mut Cpu,
            collective,
            visual_set.map(|d| d as &dyn ImageDataset),
            &mut renderer,
            &eval_options,
        )?;

        let acc1 = eval_stats.get("acc1").copied().unwrap_or(0.0);
        summary.max_accuracy = summary.max_accuracy.max(acc1);
        if main_process {
            println!(
                "Accuracy of the network on the {} test images: {acc1:.1}%",
                eval_set.len()
            );
            println!("Max accuracy: {:.2}%", summary.max_accuracy);
        }
        summary.epochs.push(EpochStats {
            epoch,
            train: train_stats,
            eval: eval_stats,
        });
    }

    if scaler.overflow_count() > 0 {
        warn!(
            rank,
            overflows = scaler.overflow_count(),
            "gradient scaler skipped steps on overflow"
        );
    }
    summary.ema_updates = ema.as_ref().map(ModelEma::num_updates);
    Ok(summary)
}
