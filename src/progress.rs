//! Periodic progress lines and the end-of-run summary
//!
//! Progress goes to stderr so it never mixes with extracted records on
//! stdout. The reporter is rate-limited to one line per second no matter
//! how often the parser ticks it.

use std::time::{Duration, Instant};

use crate::types::{ChunkInfo, ExtractSummary};

/// Rate-limited stderr progress reporter
pub struct ProgressReporter {
    enabled: bool,
    interval: Duration,
    started: Instant,
    last_report: Instant,
}

impl ProgressReporter {
    pub fn new(enabled: bool) -> Self {
        let now = Instant::now();
        ProgressReporter {
            enabled,
            interval: Duration::from_secs(1),
            started: now,
            last_report: now,
        }
    }

    /// Called once per element by the parser; prints at most once per
    /// interval.
    pub fn tick(&mut self, bytes_read: u64, records: u64, chunk_records: u64) {
        if !self.due() {
            return;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { records as f64 / elapsed } else { 0.0 };
        let mb = bytes_read as f64 / (1024.0 * 1024.0);
        let mb_rate = if elapsed > 0.0 { mb / elapsed } else { 0.0 };
        eprintln!(
            "Processing... {} records ({} in current chunk), {:.1} MiB read, {:.0} records/s, {:.1} MiB/s",
            records, chunk_records, mb, rate, mb_rate
        );
    }

    fn due(&mut self) -> bool {
        if !self.enabled || self.last_report.elapsed() < self.interval {
            return false;
        }
        self.last_report = Instant::now();
        true
    }

    /// Build the run summary from final totals.
    pub fn finish(&self, records: u64, bytes_read: u64, chunks: Vec<ChunkInfo>) -> ExtractSummary {
        ExtractSummary {
            records,
            bytes_read,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            chunks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter(enabled: bool, interval: Duration) -> ProgressReporter {
        let now = Instant::now();
        ProgressReporter {
            enabled,
            interval,
            started: now,
            last_report: now,
        }
    }

    #[test]
    fn test_disabled_reporter_is_never_due() {
        let mut progress = reporter(false, Duration::ZERO);
        assert!(!progress.due());
        assert!(!progress.due());
    }

    #[test]
    fn test_reports_are_rate_limited() {
        let mut progress = reporter(true, Duration::from_secs(3600));
        // The interval has not elapsed since construction.
        assert!(!progress.due());

        let mut progress = reporter(true, Duration::ZERO);
        assert!(progress.due());
        assert!(progress.due());
    }

    #[test]
    fn test_summary_totals() {
        let progress = reporter(true, Duration::ZERO);
        let summary = progress.finish(10, 2 * 1024 * 1024, Vec::new());
        assert_eq!(summary.records, 10);
        assert_eq!(summary.bytes_read, 2 * 1024 * 1024);
        assert!(summary.chunks.is_empty());
        assert!(summary.elapsed_secs >= 0.0);
    }
}
