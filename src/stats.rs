//! Running statistics for one consumer lifetime.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use crate::envelope::UNKNOWN_TYPE;
use crate::outcome::ProcessingOutcome;

/// Deliveries between periodic summaries unless configured otherwise.
pub const DEFAULT_SUMMARY_INTERVAL: u64 = 10;

/// Counters and timings, mutated only from the delivery-completion point.
///
/// Nothing survives a restart; a new consumer counts from zero.
#[derive(Debug, Clone)]
pub struct ConsumerStats {
    processed: u64,
    errors: u64,
    by_type: HashMap<String, u64>,
    processing_times: Vec<Duration>,
    started: Instant,
    started_at: DateTime<Utc>,
    summary_interval: u64,
}

impl Default for ConsumerStats {
    fn default() -> Self {
        Self::new(DEFAULT_SUMMARY_INTERVAL)
    }
}

impl ConsumerStats {
    /// An interval of zero disables periodic summaries.
    pub fn new(summary_interval: u64) -> Self {
        Self {
            processed: 0,
            errors: 0,
            by_type: HashMap::new(),
            processing_times: Vec::new(),
            started: Instant::now(),
            started_at: Utc::now(),
            summary_interval,
        }
    }

    /// Records one settled delivery. Returns `true` when a periodic summary is due.
    ///
    /// Failed deliveries count towards the cadence.
    pub fn record(&mut self, outcome: &ProcessingOutcome, event_type: &str) -> bool {
        self.processed += 1;

        let event_type = match outcome {
            ProcessingOutcome::DecodeFailure { .. } => UNKNOWN_TYPE,
            _ => event_type,
        };
        *self.by_type.entry(event_type.to_string()).or_insert(0) += 1;

        match outcome {
            ProcessingOutcome::Success { elapsed } => self.processing_times.push(*elapsed),
            ProcessingOutcome::DecodeFailure { .. } | ProcessingOutcome::HandlerFailure { .. } => {
                self.errors += 1
            }
        }

        self.summary_interval > 0 && self.processed % self.summary_interval == 0
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Only successes contribute a processing time.
    pub fn successes(&self) -> u64 {
        self.processing_times.len() as u64
    }

    pub fn count_for(&self, event_type: &str) -> u64 {
        self.by_type.get(event_type).copied().unwrap_or(0)
    }

    pub fn processing_times(&self) -> &[Duration] {
        &self.processing_times
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// A read-only snapshot for reporting.
    pub fn summary(&self) -> StatsSummary {
        let elapsed = self.uptime();
        let throughput = self.processed as f64 / (elapsed.as_secs_f64() + 0.001);

        let total: Duration = self.processing_times.iter().sum();
        let mean = match self.processing_times.len() {
            0 => Duration::ZERO,
            n => total / n as u32,
        };

        let mut by_type: Vec<(String, u64)> = self
            .by_type
            .iter()
            .map(|(tag, count)| (tag.clone(), *count))
            .collect();
        by_type.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        StatsSummary {
            processed: self.processed,
            errors: self.errors,
            started_at: self.started_at,
            elapsed,
            throughput,
            mean,
            min: self.processing_times.iter().min().copied().unwrap_or_default(),
            max: self.processing_times.iter().max().copied().unwrap_or_default(),
            by_type,
        }
    }
}

/// Snapshot of [`ConsumerStats`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSummary {
    pub processed: u64,
    pub errors: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Deliveries per second over the consumer's lifetime.
    pub throughput: f64,
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    /// Sorted by count descending, then tag.
    pub by_type: Vec<(String, u64)>,
}

impl StatsSummary {
    pub fn success_rate(&self) -> Option<f64> {
        if self.processed == 0 {
            return None;
        }
        Some((self.processed - self.errors) as f64 * 100.0 / self.processed as f64)
    }

    fn write_breakdown(&self, out: &mut String) {
        out.push_str("\n   By type:");
        for (tag, count) in &self.by_type {
            let share = *count as f64 * 100.0 / self.processed.max(1) as f64;
            let _ = write!(out, "\n      {}: {} ({:.1}%)", tag, count, share);
        }
    }

    pub fn periodic_report(&self) -> String {
        let mut out = format!(
            "CONSUMER STATISTICS\n   Processed: {}\n   Errors: {}\n   Rate: {:.2} msg/s\n   Mean time: {:.2}s",
            self.processed,
            self.errors,
            self.throughput,
            self.mean.as_secs_f64()
        );
        self.write_breakdown(&mut out);
        let _ = write!(out, "\n   Uptime: {}", format_uptime(self.elapsed));
        out
    }

    pub fn final_report(&self) -> String {
        let mut out = format!(
            "FINAL STATISTICS\n   Started: {}\n   Processed: {}\n   Errors: {}\n   Total time: {}\n   Mean rate: {:.2} msg/s\n   Processing times: mean {:.2}s, min {:.2}s, max {:.2}s",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            self.processed,
            self.errors,
            format_uptime(self.elapsed),
            self.throughput,
            self.mean.as_secs_f64(),
            self.min.as_secs_f64(),
            self.max.as_secs_f64()
        );
        if let Some(rate) = self.success_rate() {
            let _ = write!(out, "\n   Success rate: {:.1}%", rate);
        }
        self.write_breakdown(&mut out);
        out
    }
}

/// `M:SS` below an hour, `H:MM:SS` above.
pub fn format_uptime(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    let (hours, minutes, secs) = (seconds / 3600, (seconds / 60) % 60, seconds % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}
