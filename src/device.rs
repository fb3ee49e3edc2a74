//! Compute device abstraction
//!
//! Transfers and kernels may be queued asynchronously; [`Device::synchronize`]
//! is the only fence, and the training loop calls it before reading the
//! parameters into the EMA copy.

use crate::data::Batch;
use crate::error::Result;

/// Placement target for batches and the queue they are computed on
pub trait Device {
    fn name(&self) -> &str;

    /// Move a batch onto the device; the copy may still be in flight on return
    fn transfer(&mut self, batch: Batch) -> Result<Batch>;

    /// Block until all queued work on this device has completed
    fn synchronize(&mut self) -> Result<()>;

    /// Peak bytes allocated, when the device tracks it
    fn max_memory_allocated(&self) -> Option<u64> {
        None
    }
}

/// Host execution; every operation completes immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct Cpu;

impl Device for Cpu {
    fn name(&self) -> &str {
        "cpu"
    }

    fn transfer(&mut self, batch: Batch) -> Result<Batch> {
        Ok(batch)
    }

    fn synchronize(&mut self) -> Result<()> {
        Ok(())
    }
}
