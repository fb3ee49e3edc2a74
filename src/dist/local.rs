//! In-process worker group for multi-threaded data parallelism

use super::Collective;
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Round {
    arrived: usize,
    generation: u64,
    ready_generation: u64,
    buffer: Vec<f64>,
    result: Vec<f64>,
    aborted: Option<String>,
}

#[derive(Debug)]
struct Shared {
    world_size: usize,
    round: Mutex<Round>,
    condvar: Condvar,
}

/// One worker's handle into a group of threads reducing in lock step
///
/// # Example
///
/// ```
/// use destilar::dist::{all_reduce_mean, Collective, LocalGroup};
///
/// let handles = LocalGroup::new(2).unwrap();
/// let means: Vec<f64> = std::thread::scope(|s| {
///     let joins: Vec<_> = handles
///         .iter()
///         .map(|h| s.spawn(move || all_reduce_mean(h, h.rank() as f64).unwrap()))
///         .collect();
///     joins.into_iter().map(|j| j.join().unwrap()).collect()
/// });
/// assert_eq!(means, vec![0.5, 0.5]);
/// ```
#[derive(Debug, Clone)]
pub struct LocalGroup {
    shared: Arc<Shared>,
    rank: usize,
}

impl LocalGroup {
    /// Create handles for ranks `0..world_size`
    pub fn new(world_size: usize) -> Result<Vec<Self>> {
        if world_size == 0 {
            return Err(Error::Collective("world size must be positive, got 0".into()));
        }
        let shared = Arc::new(Shared {
            world_size,
            round: Mutex::new(Round::default()),
            condvar: Condvar::new(),
        });
        Ok((0..world_size)
            .map(|rank| Self {
                shared: Arc::clone(&shared),
                rank,
            })
            .collect())
    }

    /// Fail every pending and future reduction in the group
    ///
    /// A worker that stops early calls this so its peers return
    /// [`Error::Collective`] instead of waiting for it forever.
    pub fn abort(&self, reason: &str) {
        let mut round = self.shared.round.lock();
        if round.aborted.is_none() {
            round.aborted = Some(format!("rank {} aborted: {reason}", self.rank));
        }
        self.shared.condvar.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.round.lock().aborted.is_some()
    }
}

impl Collective for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.shared.world_size
    }

    fn all_reduce_sum(&self, values: &mut [f64]) -> Result<()> {
        let shared = &self.shared;
        let mut round = shared.round.lock();
        if let Some(message) = &round.aborted {
            return Err(Error::Collective(message.clone()));
        }

        if round.arrived == 0 {
            round.generation = round.generation.wrapping_add(1);
            round.buffer.clear();
            round.buffer.resize(values.len(), 0.0);
        } else if round.buffer.len() != values.len() {
            // ranks are out of step and cannot resynchronize
            let message = format!(
                "buffer length mismatch on rank {}: expected {}, got {}",
                self.rank,
                round.buffer.len(),
                values.len()
            );
            round.aborted = Some(message.clone());
            shared.condvar.notify_all();
            return Err(Error::Collective(message));
        }

        for (dst, v) in round.buffer.iter_mut().zip(values.iter()) {
            *dst += *v;
        }
        round.arrived += 1;
        let generation = round.generation;

        if round.arrived == shared.world_size {
            let result = std::mem::take(&mut round.buffer);
            round.result = result;
            round.arrived = 0;
            round.ready_generation = generation;
            shared.condvar.notify_all();
        } else {
            while round.ready_generation != generation && round.aborted.is_none() {
                shared.condvar.wait(&mut round);
            }
            if round.ready_generation != generation {
                if let Some(message) = &round.aborted {
                    return Err(Error::Collective(message.clone()));
                }
            }
        }

        values.copy_from_slice(&round.result);
        Ok(())
    }
}
