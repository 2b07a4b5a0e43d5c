//! Per-run playback timing.
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Wall-clock start and time-to-first-audio of one pipeline run.
#[derive(Debug, Clone)]
pub struct PlaybackTiming {
    pub started_at: DateTime<Utc>,
    start: Instant,
    first_audio: Option<Duration>,
    total: Option<Duration>,
    pub frames: usize,
    pub bytes: usize,
}

impl PlaybackTiming {
    pub fn start() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Timing measured from a caller-supplied start instant.
    pub fn starting_at(start: Instant) -> Self {
        let since_start =
            chrono::Duration::from_std(start.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            started_at: Utc::now() - since_start,
            start,
            first_audio: None,
            total: None,
            frames: 0,
            bytes: 0,
        }
    }

    /// Counts a delivered frame. Returns true for the first non-empty one.
    pub fn record_frame(&mut self, len: usize) -> bool {
        if len == 0 {
            return false;
        }
        self.frames += 1;
        self.bytes += len;
        if self.first_audio.is_none() {
            self.first_audio = Some(self.start.elapsed());
            return true;
        }
        false
    }

    pub fn finish(&mut self) {
        if self.total.is_none() {
            self.total = Some(self.start.elapsed());
        }
    }

    pub fn time_to_first_audio(&self) -> Option<Duration> {
        self.first_audio
    }

    /// Duration of the whole run, once finished.
    pub fn total(&self) -> Option<Duration> {
        self.total
    }

    pub fn report(&self) -> TimingReport {
        TimingReport {
            started_at: self.started_at,
            time_to_first_audio_ms: self.first_audio.map(|d| d.as_secs_f64() * 1000.0),
            total_ms: self.total.map(|d| d.as_secs_f64() * 1000.0),
            frames: self.frames,
            bytes: self.bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimingReport {
    pub started_at: DateTime<Utc>,
    pub time_to_first_audio_ms: Option<f64>,
    pub total_ms: Option<f64>,
    pub frames: usize,
    pub bytes: usize,
}
