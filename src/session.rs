use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

/// Estimated spend is kept in millionths of a dollar so it fits an atomic.
const MICROS_PER_USD: f64 = 1_000_000.0;

/// Each issue usually needs between one and two model calls.
const CALLS_PER_ISSUE: f64 = 1.5;

/// Run-scoped counters for everything the pipeline did.
///
/// Shared by reference; every increment is atomic so issues could be
/// processed concurrently without losing counts.
#[derive(Debug)]
pub struct SessionTally {
    started_at: DateTime<Local>,
    started: Instant,
    model_calls: AtomicU64,
    cost_micros: AtomicU64,
    issues_handled: AtomicU64,
    changes_published: AtomicU64,
    questions_asked: AtomicU64,
}

impl Default for SessionTally {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionTally {
    pub fn new() -> Self {
        Self {
            started_at: Local::now(),
            started: Instant::now(),
            model_calls: AtomicU64::new(0),
            cost_micros: AtomicU64::new(0),
            issues_handled: AtomicU64::new(0),
            changes_published: AtomicU64::new(0),
            questions_asked: AtomicU64::new(0),
        }
    }

    /// Count one model call and add its estimated cost in USD.
    pub fn record_model_call(&self, cost_usd: f64) {
        self.model_calls.fetch_add(1, Ordering::Relaxed);
        if cost_usd > 0.0 {
            let micros = (cost_usd * MICROS_PER_USD).round() as u64;
            self.cost_micros.fetch_add(micros, Ordering::Relaxed);
        }
    }

    pub fn record_issue_handled(&self) {
        self.issues_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_change_published(&self) {
        self.changes_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_question_asked(&self) {
        self.questions_asked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionSummary {
        SessionSummary {
            started_at: self.started_at,
            elapsed: self.started.elapsed(),
            model_calls: self.model_calls.load(Ordering::Relaxed),
            estimated_cost_usd: self.cost_micros.load(Ordering::Relaxed) as f64 / MICROS_PER_USD,
            issues_handled: self.issues_handled.load(Ordering::Relaxed),
            changes_published: self.changes_published.load(Ordering::Relaxed),
            questions_asked: self.questions_asked.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the tally, printed at the end of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
    pub model_calls: u64,
    pub estimated_cost_usd: f64,
    pub issues_handled: u64,
    pub changes_published: u64,
    pub questions_asked: u64,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Session summary")?;
        writeln!(
            f,
            "  Started:            {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        writeln!(f, "  Duration:           {}s", self.elapsed.as_secs())?;
        writeln!(f, "  Model calls:        {}", self.model_calls)?;
        writeln!(f, "  Issues handled:     {}", self.issues_handled)?;
        writeln!(f, "  Changes published:  {}", self.changes_published)?;
        writeln!(f, "  Questions asked:    {}", self.questions_asked)?;
        if self.estimated_cost_usd > 0.0 {
            write!(f, "  Estimated cost:     ${:.4}", self.estimated_cost_usd)
        } else {
            write!(f, "  Estimated cost:     free")
        }
    }
}

/// Rough spend for processing `issue_count` issues, shown before "fix all".
pub fn estimate_cost(issue_count: usize, cost_per_call: f64) -> f64 {
    issue_count as f64 * cost_per_call * CALLS_PER_ISSUE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_counters_start_at_zero() {
        let summary = SessionTally::new().snapshot();
        assert_eq!(summary.model_calls, 0);
        assert_eq!(summary.issues_handled, 0);
        assert_eq!(summary.changes_published, 0);
        assert_eq!(summary.questions_asked, 0);
        assert_eq!(summary.estimated_cost_usd, 0.0);
    }

    #[test]
    fn test_record_model_call_accumulates_cost() {
        let tally = SessionTally::new();
        tally.record_model_call(0.002);
        tally.record_model_call(0.002);
        tally.record_model_call(0.0);
        let summary = tally.snapshot();
        assert_eq!(summary.model_calls, 3);
        assert!((summary.estimated_cost_usd - 0.004).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let tally = Arc::new(SessionTally::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tally = Arc::clone(&tally);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        tally.record_issue_handled();
                        tally.record_model_call(0.001);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = tally.snapshot();
        assert_eq!(summary.issues_handled, 8000);
        assert_eq!(summary.model_calls, 8000);
        assert!((summary.estimated_cost_usd - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_summary_reports_free_for_local_models() {
        let tally = SessionTally::new();
        tally.record_model_call(0.0);
        tally.record_question_asked();
        let text = tally.snapshot().to_string();
        assert!(text.contains("Model calls:        1"));
        assert!(text.contains("Questions asked:    1"));
        assert!(text.ends_with("free"));
    }

    #[test]
    fn test_summary_reports_cost_when_paid() {
        let tally = SessionTally::new();
        tally.record_model_call(0.002);
        tally.record_change_published();
        let text = tally.snapshot().to_string();
        assert!(text.contains("$0.0020"));
        assert!(text.contains("Changes published:  1"));
    }

    #[test]
    fn test_estimate_cost() {
        assert!((estimate_cost(10, 0.002) - 0.03).abs() < 1e-9);
        assert_eq!(estimate_cost(5, 0.0), 0.0);
        assert_eq!(estimate_cost(0, 0.002), 0.0);
    }
}
