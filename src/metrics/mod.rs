//! Metric aggregation and logging
//!
//! - [`SmoothedValue`] / [`MetricLogger`]: per-worker running statistics,
//!   reduced across workers at the end of a pass
//! - [`ProgressLogger`]: log-every-N console progress
//! - [`accuracy`]: top-k accuracy in percent
//! - [`ScalarSink`]: structured scalar writes keyed by [`epoch_1000x`]

mod accuracy;
mod logger;
mod progress;
mod sink;
mod smoothed;

pub use accuracy::accuracy;
pub use logger::MetricLogger;
pub use progress::{format_duration, ProgressLogger};
pub use sink::{JsonlScalarWriter, MemorySink, ScalarRecord, ScalarSink};
pub use smoothed::{SmoothedValue, DEFAULT_FORMAT, DEFAULT_WINDOW};

/// Fractional-epoch x-axis for scalar logs, `floor((step / num_batches + epoch) * 1000)`
///
/// Curves from runs with different batch sizes line up on this axis.
pub fn epoch_1000x(step: usize, num_batches: usize, epoch: usize) -> u64 {
    if num_batches == 0 {
        return epoch as u64 * 1000;
    }
    ((step as f64 / num_batches as f64 + epoch as f64) * 1000.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_epoch_1000x_values() {
        assert_eq!(epoch_1000x(0, 4, 0), 0);
        assert_eq!(epoch_1000x(1, 4, 0), 250);
        assert_eq!(epoch_1000x(3, 4, 2), 2750);
        assert_eq!(epoch_1000x(1, 3, 0), 333);
    }

    proptest! {
        #[test]
        fn prop_monotone_within_epoch(num_batches in 1usize..5000, epoch in 0usize..300) {
            let mut prev = epoch_1000x(0, num_batches, epoch);
            for step in 1..num_batches.min(200) {
                let x = epoch_1000x(step, num_batches, epoch);
                prop_assert!(x >= prev);
                prev = x;
            }
        }

        #[test]
        fn prop_increasing_across_epochs(
            num_batches in 1usize..5000,
            step_frac in 0.0f64..1.0,
            epoch in 0usize..300,
        ) {
            let step = ((num_batches as f64) * step_frac) as usize;
            prop_assert!(epoch_1000x(step, num_batches, epoch + 1) > epoch_1000x(step, num_batches, epoch));
        }
    }
}
