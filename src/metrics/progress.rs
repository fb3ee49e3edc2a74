//! Periodic console progress for a fixed-length pass

use super::{MetricLogger, SmoothedValue};
use crate::device::Device;
use std::time::{Duration, Instant};

const MB: f64 = 1024.0 * 1024.0;

/// Format a duration as `H:MM:SS`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Prints a progress line every `print_freq` steps and on the last step
///
/// Drive it from the loop: call [`data_ready`](Self::data_ready) once the
/// batch is in hand and [`step_done`](Self::step_done) after the step body,
/// then [`finish`](Self::finish) after the last step.
#[derive(Debug)]
pub struct ProgressLogger {
    header: String,
    total: usize,
    print_freq: usize,
    delimiter: String,
    start: Instant,
    end: Instant,
    iter_time: SmoothedValue,
    data_time: SmoothedValue,
}

impl ProgressLogger {
    pub fn new(header: impl Into<String>, total: usize, print_freq: usize) -> Self {
        let now = Instant::now();
        Self {
            header: header.into(),
            total,
            print_freq: print_freq.max(1),
            delimiter: "  ".to_string(),
            start: now,
            end: now,
            iter_time: SmoothedValue::with_format(20, "{avg:.4}"),
            data_time: SmoothedValue::with_format(20, "{avg:.4}"),
        }
    }

    pub fn header(&self) -> &str {
        &self.header
    }

    /// Whether step `i` gets a progress line
    pub fn should_log(&self, i: usize) -> bool {
        i % self.print_freq == 0 || i + 1 == self.total
    }

    /// Record the time spent waiting for the batch
    pub fn data_ready(&mut self) {
        self.data_time.update(self.end.elapsed().as_secs_f64(), 1);
    }

    /// Record step `i` and print its progress line when due
    pub fn step_done(&mut self, i: usize, meters: &MetricLogger, device: &dyn Device) -> Option<String> {
        self.iter_time.update(self.end.elapsed().as_secs_f64(), 1);
        let line = self.should_log(i).then(|| {
            let line = self.line(i, meters, device);
            println!("{line}");
            line
        });
        self.end = Instant::now();
        line
    }

    fn line(&self, i: usize, meters: &MetricLogger, device: &dyn Device) -> String {
        let width = self.total.to_string().len();
        let remaining = self.total.saturating_sub(i) as f64;
        let eta = Duration::from_secs_f64((self.iter_time.global_avg() * remaining).max(0.0));

        let mut parts = vec![
            self.header.clone(),
            format!("[{i:>width$}/{}]", self.total),
            format!("eta: {}", format_duration(eta)),
            meters.to_string(),
            format!("time: {}", self.iter_time),
            format!("data: {}", self.data_time),
        ];
        if let Some(bytes) = device.max_memory_allocated() {
            parts.push(format!("max mem: {:.0}", bytes as f64 / MB));
        }
        parts.retain(|p| !p.is_empty());
        parts.join(&self.delimiter)
    }

    /// Print the end-of-pass timing line
    pub fn finish(&self) -> String {
        let total_time = self.start.elapsed();
        let per_iter = total_time.as_secs_f64() / self.total.max(1) as f64;
        let line = format!(
            "{} Total time: {} ({per_iter:.4} s / it)",
            self.header,
            format_duration(total_time)
        );
        println!("{line}");
        line
    }
}
