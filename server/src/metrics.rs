// Pipeline run metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tts_core::{PipelineError, PlaybackTiming};

/// Samples kept for percentile calculation.
const MAX_SAMPLES: usize = 1000;

/// Counters and time-to-first-audio samples across pipeline runs.
#[derive(Debug)]
pub struct PipelineMetrics {
    started: Instant,
    pub request_count: AtomicU64,
    pub run_count: AtomicU64,
    pub failure_count: AtomicU64,
    pub cancelled_count: AtomicU64,
    total_ttfa_ms: AtomicU64,
    ttfa_count: AtomicU64,
    ttfa_samples: Mutex<VecDeque<u64>>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            request_count: AtomicU64::new(0),
            run_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            cancelled_count: AtomicU64::new(0),
            total_ttfa_ms: AtomicU64::new(0),
            ttfa_count: AtomicU64::new(0),
            ttfa_samples: Mutex::new(VecDeque::with_capacity(MAX_SAMPLES)),
        }
    }

    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of one run.
    pub fn record_run(&self, result: &Result<PlaybackTiming, PipelineError>) {
        self.run_count.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(timing) => {
                if let Some(ttfa) = timing.time_to_first_audio() {
                    self.record_ttfa(ttfa.as_millis() as u64);
                }
            }
            Err(PipelineError::Cancelled) => {
                self.cancelled_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.failure_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// A run that failed before it could start.
    pub fn record_failure(&self) {
        self.run_count.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_ttfa(&self, ttfa_ms: u64) {
        self.total_ttfa_ms.fetch_add(ttfa_ms, Ordering::Relaxed);
        self.ttfa_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut samples) = self.ttfa_samples.lock() {
            if samples.len() == MAX_SAMPLES {
                samples.pop_front();
            }
            samples.push_back(ttfa_ms);
        }
    }

    fn percentile(&self, p: u8) -> Option<u64> {
        let samples = self.ttfa_samples.lock().ok()?;
        if samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        sorted.sort_unstable();
        let index = (sorted.len() * p as usize / 100).min(sorted.len() - 1);
        Some(sorted[index])
    }

    pub fn snapshot(&self) -> MetricsResponse {
        let measured = self.ttfa_count.load(Ordering::Relaxed);
        let avg_ttfa_ms = if measured == 0 {
            None
        } else {
            Some(self.total_ttfa_ms.load(Ordering::Relaxed) as f64 / measured as f64)
        };

        MetricsResponse {
            timestamp: Utc::now(),
            uptime_seconds: self.started.elapsed().as_secs(),
            request_count: self.request_count.load(Ordering::Relaxed),
            runs: self.run_count.load(Ordering::Relaxed),
            failures: self.failure_count.load(Ordering::Relaxed),
            cancelled: self.cancelled_count.load(Ordering::Relaxed),
            ttfa_avg_ms: avg_ttfa_ms,
            ttfa_p50_ms: self.percentile(50),
            ttfa_p95_ms: self.percentile(95),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub request_count: u64,
    pub runs: u64,
    pub failures: u64,
    pub cancelled: u64,
    pub ttfa_avg_ms: Option<f64>,
    pub ttfa_p50_ms: Option<u64>,
    pub ttfa_p95_ms: Option<u64>,
}
