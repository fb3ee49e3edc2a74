//! Destilar CLI
//!
//! # Usage
//!
//! ```bash
//! # Check a config
//! destilar validate config.yaml
//!
//! # Show the resolved config
//! destilar info config.yaml --format yaml
//!
//! # Train and evaluate with overrides
//! destilar run config.yaml --epochs 2 --world-size 2 --visual-dir out/visual
//! ```
//!
//! A diverged run exits with status 1; every other failure exits with 2.

use clap::Parser;
use destilar::config::{
    apply_overrides, load_config, run, Cli, Command, InfoArgs, OutputFormat, RunArgs,
    ValidateArgs,
};
use destilar::{Error, Result};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Command::Validate(args) => run_validate(&args),
        Command::Info(args) => run_info(&args),
        Command::Run(args) => run_training(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run_validate(args: &ValidateArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    println!("Configuration is valid: {}", args.config.display());
    println!("  Epochs: {}", config.train.epochs);
    println!("  Workers: {}", config.world_size);
    println!("  Distillation: {}", config.distillation.kind);
    Ok(())
}

fn run_info(args: &InfoArgs) -> Result<()> {
    let config = load_config(&args.config)?;

    match args.format {
        OutputFormat::Text => {
            let train = &config.train;
            println!("Configuration Info:");
            println!();
            println!(
                "Optimizer: {} (lr={}, weight_decay={})",
                train.optimizer, train.lr, train.weight_decay
            );
            println!("Epochs: {} (warmup {})", train.epochs, train.warmup_epochs);
            println!("Precision: {}", train.precision.name());
            if let Some(clip) = train.clip_grad {
                println!("Gradient clipping: {clip}");
            }
            if train.model_ema {
                println!("Model EMA: decay {}", train.model_ema_decay);
            }
            println!(
                "Data: {} classes, {} train / {} eval samples, batch {}",
                config.data.num_classes,
                config.data.samples,
                config.data.eval_samples,
                config.data.batch_size
            );
            if config.mixup.is_active() {
                println!(
                    "Mixup: alpha {} / cutmix {} (prob {})",
                    config.mixup.mixup_alpha, config.mixup.cutmix_alpha, config.mixup.prob
                );
            }
            println!(
                "Distillation: {} (alpha {}, tau {})",
                config.distillation.kind, config.distillation.alpha, config.distillation.tau
            );
            if config.visual.enabled {
                println!("Figures: {}", config.visual.output_dir.display());
            }
            println!("Workers: {}", config.world_size);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&config)
                .map_err(|e| Error::Serialization(e.to_string()))?;
            println!("{yaml}");
        }
    }
    Ok(())
}

fn run_training(args: &RunArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    apply_overrides(&mut config, args);

    let summary = run(&config)?;
    if let Some(last) = summary.epochs.last() {
        let line = serde_json::to_string(&last.eval)?;
        println!("Final eval stats: {line}");
    }
    println!("Max accuracy: {:.2}%", summary.max_accuracy);
    Ok(())
}
