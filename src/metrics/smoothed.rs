//! Windowed running statistic

use crate::dist::Collective;
use crate::error::Result;
use std::collections::VecDeque;
use std::fmt;

/// Default sliding window length
pub const DEFAULT_WINDOW: usize = 20;

/// Default display: windowed median and global average
pub const DEFAULT_FORMAT: &str = "{median:.4} ({global_avg:.4})";

/// Track a series of values and provide access to smoothed values over a
/// window or the global series average.
///
/// The format string accepts `{median}`, `{avg}`, `{global_avg}`, `{max}` and
/// `{value}`, each with an optional precision such as `{value:.6}`.
#[derive(Debug, Clone)]
pub struct SmoothedValue {
    window: VecDeque<f64>,
    window_size: usize,
    total: f64,
    count: u64,
    fmt: String,
}

impl Default for SmoothedValue {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl SmoothedValue {
    pub fn new(window_size: usize) -> Self {
        Self::with_format(window_size, DEFAULT_FORMAT)
    }

    pub fn with_format(window_size: usize, fmt: &str) -> Self {
        let window_size = window_size.max(1);
        Self {
            window: VecDeque::with_capacity(window_size),
            window_size,
            total: 0.0,
            count: 0,
            fmt: fmt.to_string(),
        }
    }

    /// Record `value` observed over `n` samples
    pub fn update(&mut self, value: f64, n: u64) {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(value);
        self.count += n;
        self.total += value * n as f64;
    }

    /// Sum `count` and `total` across workers; the window stays local
    pub fn synchronize(&mut self, collective: &dyn Collective) -> Result<()> {
        let mut buf = [self.count as f64, self.total];
        collective.all_reduce_sum(&mut buf)?;
        self.count = buf[0].round() as u64;
        self.total = buf[1];
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    /// Lower median of the window
    pub fn median(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.window.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted[(sorted.len() - 1) / 2]
    }

    pub fn avg(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    /// Count-weighted mean over every update
    pub fn global_avg(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total / self.count as f64
    }

    pub fn max(&self) -> f64 {
        self.window.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Most recent value
    pub fn value(&self) -> f64 {
        self.window.back().copied().unwrap_or(0.0)
    }

    fn field(&self, name: &str) -> Option<f64> {
        match name {
            "median" => Some(self.median()),
            "avg" => Some(self.avg()),
            "global_avg" => Some(self.global_avg()),
            "max" => Some(self.max()),
            "value" => Some(self.value()),
            _ => None,
        }
    }
}

impl fmt::Display for SmoothedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.fmt.as_str();
        while let Some(open) = rest.find('{') {
            f.write_str(&rest[..open])?;
            let Some(close) = rest[open..].find('}') else {
                rest = &rest[open..];
                break;
            };
            let spec = &rest[open + 1..open + close];
            let (name, precision) = match spec.split_once(":.") {
                Some((name, p)) => (name, p.parse::<usize>().ok()),
                None => (spec, None),
            };
            match (self.field(name), precision) {
                (Some(v), Some(p)) => write!(f, "{v:.p$}")?,
                (Some(v), None) => write!(f, "{v}")?,
                (None, _) => f.write_str(&rest[open..=open + close])?,
            }
            rest = &rest[open + close + 1..];
        }
        f.write_str(rest)
    }
}
