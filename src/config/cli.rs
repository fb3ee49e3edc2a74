//! CLI argument parsing
//!
//! # Usage
//!
//! ```bash
//! destilar validate config.yaml
//! destilar info config.yaml --format yaml
//! destilar run config.yaml --epochs 1 --world-size 2
//! ```

use super::schema::EngineConfig;
use crate::precision::Precision;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Destilar: distillation-aware training and evaluation driver
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "destilar")]
#[command(version)]
#[command(about = "Train and evaluate with distillation, EMA, mixed precision and attention figures")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Validate a configuration file without running
    Validate(ValidateArgs),

    /// Display the fully resolved configuration
    Info(InfoArgs),

    /// Train and evaluate on the synthetic dataset
    Run(RunArgs),
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,
}

/// Arguments for the info command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InfoArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Arguments for the run command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct RunArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Override number of epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Override training batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Override learning rate
    #[arg(long)]
    pub lr: Option<f32>,

    /// Override number of in-process workers
    #[arg(short, long)]
    pub world_size: Option<usize>,

    /// Override autocast precision
    #[arg(long, value_enum)]
    pub precision: Option<PrecisionArg>,

    /// Render attention figures into this directory
    #[arg(long)]
    pub visual_dir: Option<PathBuf>,

    /// Write scalar logs into this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

/// Output format for the info command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

/// Autocast precision on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PrecisionArg {
    Fp32,
    Fp16,
    Bf16,
}

impl From<PrecisionArg> for Precision {
    fn from(arg: PrecisionArg) -> Self {
        match arg {
            PrecisionArg::Fp32 => Precision::Fp32,
            PrecisionArg::Fp16 => Precision::Fp16,
            PrecisionArg::Bf16 => Precision::Bf16,
        }
    }
}

/// Parse CLI arguments from a string slice (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Apply command-line overrides to a loaded config
pub fn apply_overrides(config: &mut EngineConfig, args: &RunArgs) {
    if let Some(epochs) = args.epochs {
        config.train.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.data.batch_size = batch_size;
    }
    if let Some(lr) = args.lr {
        config.train.lr = lr;
    }
    if let Some(world_size) = args.world_size {
        config.world_size = world_size;
    }
    if let Some(precision) = args.precision {
        config.train.precision = precision.into();
    }
    if let Some(dir) = &args.visual_dir {
        config.visual.enabled = true;
        config.visual.output_dir = dir.clone();
    }
    if let Some(dir) = &args.log_dir {
        config.train.log_dir = Some(dir.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = parse_args(["destilar", "run", "config.yaml"]).unwrap();
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config, PathBuf::from("config.yaml"));
                assert!(args.epochs.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = parse_args([
            "destilar",
            "run",
            "config.yaml",
            "--epochs",
            "2",
            "--world-size",
            "4",
            "--precision",
            "bf16",
            "--visual-dir",
            "figs",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("Expected Run command");
        };

        let mut config = EngineConfig::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.train.epochs, 2);
        assert_eq!(config.world_size, 4);
        assert_eq!(config.train.precision, Precision::Bf16);
        assert!(config.visual.enabled);
        assert_eq!(config.visual.output_dir, PathBuf::from("figs"));
    }

    #[test]
    fn test_parse_info_format() {
        let cli = parse_args(["destilar", "info", "c.yaml", "--format", "json"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Info(InfoArgs {
                config: PathBuf::from("c.yaml"),
                format: OutputFormat::Json,
            })
        );
    }

    #[test]
    fn test_global_flags() {
        let cli = parse_args(["destilar", "validate", "c.yaml", "--quiet"]).unwrap();
        assert!(cli.quiet);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_missing_config_is_an_error() {
        assert!(parse_args(["destilar", "run"]).is_err());
    }
}
