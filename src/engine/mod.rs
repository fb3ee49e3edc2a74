//! Epoch drivers
//!
//! - [`train_one_epoch`]: one pass of scaled optimization with EMA and
//!   cross-worker metric reduction
//! - [`evaluate`]: top-1/top-5 accuracy and loss, plus attention figures
//!   when the original dataset is supplied
//!
//! # Example
//!
//! ```no_run
//! use destilar::data::{DataLoader, InMemoryDataset, SyntheticConfig};
//! use destilar::device::Cpu;
//! use destilar::dist::SingleProcess;
//! use destilar::distill::{BaseCriterion, DistillationLoss};
//! use destilar::engine::{evaluate, train_one_epoch, EvalOptions, TrainOptions};
//! use destilar::nn::LinearClassifier;
//! use destilar::optim::SGD;
//! use destilar::precision::GradScaler;
//! use destilar::visual::PngGridRenderer;
//!
//! let dataset = InMemoryDataset::synthetic(&SyntheticConfig::default())?;
//! let loader = DataLoader::new(&dataset, 32)?;
//! let mut model = LinearClassifier::new(3 * 16 * 16, 10, 0);
//! let mut criterion = DistillationLoss::base_only(BaseCriterion::CrossEntropy);
//! let mut optimizer = SGD::new(0.1, 0.9);
//! let mut scaler = GradScaler::disabled();
//!
//! let stats = train_one_epoch(
//!     &mut model, &mut criterion, &loader, &mut optimizer, &mut scaler,
//!     &mut Cpu, &SingleProcess, None, None, None, &TrainOptions::new(),
//! )?;
//! println!("train loss {:.3}", stats["loss"]);
//!
//! let stats = evaluate(
//!     &loader, &mut model, &mut Cpu, &SingleProcess, None,
//!     &mut PngGridRenderer, &EvalOptions::default(),
//! )?;
//! println!("acc1 {:.1}", stats["acc1"]);
//! # Ok::<(), destilar::Error>(())
//! ```

mod evaluate;
mod train;

pub use evaluate::{evaluate, EvalOptions};
pub use train::{train_one_epoch, TrainOptions};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataLoader, InMemoryDataset, SyntheticConfig};
    use crate::device::Cpu;
    use crate::dist::SingleProcess;
    use crate::distill::{BaseCriterion, DistillationLoss};
    use crate::metrics::MemorySink;
    use crate::nn::{LinearClassifier, Model};
    use crate::optim::SGD;
    use crate::precision::{GradScaler, Precision};
    use crate::visual::PngGridRenderer;

    fn dataset() -> InMemoryDataset {
        InMemoryDataset::synthetic(&SyntheticConfig {
            num_classes: 4,
            samples: 64,
            image_size: 4,
            ..SyntheticConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_train_then_evaluate() {
        let ds = dataset();
        let loader = DataLoader::new(&ds, 16).unwrap();
        let mut model = LinearClassifier::new(3 * 4 * 4, 4, 1);
        let mut criterion = DistillationLoss::base_only(BaseCriterion::CrossEntropy);
        let mut optimizer = SGD::new(0.5, 0.0);
        let mut scaler = GradScaler::disabled();
        let mut sink = MemorySink::new();
        let options = TrainOptions::new().with_precision(Precision::Fp32).with_epoch(2);

        let stats = train_one_epoch(
            &mut model,
            &mut criterion,
            &loader,
            &mut optimizer,
            &mut scaler,
            &mut Cpu,
            &SingleProcess,
            None,
            None,
            Some(&mut sink),
            &options,
        )
        .unwrap();
        assert!(stats["loss"].is_finite());
        assert_eq!(stats["lr"], 0.5_f32 as f64);
        assert!(model.is_training());

        let steps: Vec<u64> = sink.series("loss").iter().map(|(x, _)| *x).collect();
        assert_eq!(steps, vec![2000, 2250, 2500, 2750]);

        let eval = evaluate(
            &loader,
            &mut model,
            &mut Cpu,
            &SingleProcess,
            None,
            &mut PngGridRenderer,
            &EvalOptions::default().with_precision(Precision::Fp32),
        )
        .unwrap();
        assert!(!model.is_training());
        assert!(eval["acc1"] <= eval["acc5"]);
        assert!(eval.contains_key("loss"));
    }
}
