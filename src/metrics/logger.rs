//! Named meters for one training or evaluation pass

use super::SmoothedValue;
use crate::dist::Collective;
use crate::error::Result;
use std::collections::BTreeMap;
use std::fmt;

/// Ordered collection of [`SmoothedValue`] meters
///
/// Meters are created on first update and keep insertion order, so every
/// worker reduces them in the same sequence.
#[derive(Debug, Clone)]
pub struct MetricLogger {
    meters: Vec<(String, SmoothedValue)>,
    delimiter: String,
}

impl Default for MetricLogger {
    fn default() -> Self {
        Self::new("  ")
    }
}

impl MetricLogger {
    pub fn new(delimiter: &str) -> Self {
        Self {
            meters: Vec::new(),
            delimiter: delimiter.to_string(),
        }
    }

    /// Register a meter with custom window or format
    pub fn add_meter(&mut self, name: &str, meter: SmoothedValue) {
        match self.meters.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = meter,
            None => self.meters.push((name.to_string(), meter)),
        }
    }

    pub fn update(&mut self, name: &str, value: f64) {
        self.update_weighted(name, value, 1);
    }

    /// Record `value` as the mean over `n` samples
    pub fn update_weighted(&mut self, name: &str, value: f64, n: u64) {
        self.meter_entry(name).update(value, n);
    }

    fn meter_entry(&mut self, name: &str) -> &mut SmoothedValue {
        let index = match self.meters.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.meters.push((name.to_string(), SmoothedValue::default()));
                self.meters.len() - 1
            }
        };
        &mut self.meters[index].1
    }

    pub fn meter(&self, name: &str) -> Option<&SmoothedValue> {
        self.meters.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.meters.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.meters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meters.is_empty()
    }

    /// Reduce every meter's count and total across workers
    pub fn synchronize(&mut self, collective: &dyn Collective) -> Result<()> {
        for (_, meter) in &mut self.meters {
            meter.synchronize(collective)?;
        }
        Ok(())
    }

    /// `name -> global average` for every meter
    pub fn global_averages(&self) -> BTreeMap<String, f64> {
        self.meters
            .iter()
            .map(|(name, meter)| (name.clone(), meter.global_avg()))
            .collect()
    }
}

impl fmt::Display for MetricLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, meter)) in self.meters.iter().enumerate() {
            if i > 0 {
                f.write_str(&self.delimiter)?;
            }
            write!(f, "{name}: {meter}")?;
        }
        Ok(())
    }
}
