//! Cross-worker reductions
//!
//! Every worker must issue the same collectives in the same order; a worker
//! that skips one leaves the others blocked.

mod local;

pub use local::LocalGroup;

use crate::error::Result;

/// Blocking collective operations over a fixed group of workers
pub trait Collective: Send + Sync {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    /// Replace every element of `values` with its sum across all workers
    fn all_reduce_sum(&self, values: &mut [f64]) -> Result<()>;

    fn is_main_process(&self) -> bool {
        self.rank() == 0
    }
}

/// Mean of `value` across all workers
pub fn all_reduce_mean(collective: &dyn Collective, value: f64) -> Result<f64> {
    let world_size = collective.world_size();
    if world_size <= 1 {
        return Ok(value);
    }
    let mut buf = [value];
    collective.all_reduce_sum(&mut buf)?;
    Ok(buf[0] / world_size as f64)
}

/// A group of one; every reduction is the identity
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Collective for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, _values: &mut [f64]) -> Result<()> {
        Ok(())
    }
}
