use crate::error::FeedError;
use crate::market::aggregator::ApplyOutcome;
use crate::market::types::FeedStatusSnapshot;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

const FRAME_TIMING_SAMPLES: usize = 2_048;

/// Hooks the pipeline calls into. Every method defaults to a no-op so an
/// observer only implements what it needs.
pub trait FeedObserver: Send + Sync {
    fn on_status(&self, _status: &FeedStatusSnapshot) {}

    fn on_frame(&self, _documents: usize, _elapsed_us: u32) {}

    fn on_decode_error(&self, _error: &FeedError) {}

    fn on_record(&self, _outcome: &ApplyOutcome) {}

    fn on_charts_refreshed(&self, _instruments: usize) {}
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl FeedObserver for NoopObserver {}

/// Fixed ring of recent per-frame processing times, in microseconds.
#[derive(Debug, Clone)]
struct FrameTimingWindow {
    samples_us: Box<[u32; FRAME_TIMING_SAMPLES]>,
    filled: usize,
    next_slot: usize,
}

impl Default for FrameTimingWindow {
    fn default() -> Self {
        Self {
            samples_us: Box::new([0; FRAME_TIMING_SAMPLES]),
            filled: 0,
            next_slot: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FrameTimingPercentiles {
    p50_us: Option<u32>,
    p95_us: Option<u32>,
    p99_us: Option<u32>,
}

impl FrameTimingWindow {
    fn record(&mut self, elapsed_us: u32) {
        self.samples_us[self.next_slot] = elapsed_us;
        self.next_slot = (self.next_slot + 1) % FRAME_TIMING_SAMPLES;
        self.filled = (self.filled + 1).min(FRAME_TIMING_SAMPLES);
    }

    fn percentiles(&self) -> FrameTimingPercentiles {
        let mut sorted = self.samples_us[..self.filled].to_vec();
        sorted.sort_unstable();

        // Nearest-rank on the filled prefix; empty windows report nothing.
        let rank = |percentile: usize| {
            let last = sorted.len().checked_sub(1)?;
            sorted.get(last * percentile / 100).copied()
        };

        FrameTimingPercentiles {
            p50_us: rank(50),
            p95_us: rank(95),
            p99_us: rank(99),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FeedTelemetrySnapshot {
    pub frames: u64,
    pub documents: u64,
    pub decode_errors: u64,
    pub records_applied: u64,
    pub records_discarded: u64,
    pub records_ignored: u64,
    pub status_changes: u64,
    pub chart_refreshes: u64,
    pub frame_p50_us: Option<u32>,
    pub frame_p95_us: Option<u32>,
    pub frame_p99_us: Option<u32>,
}

/// Counting observer for debug overlays and the probe binary.
#[derive(Debug, Default)]
pub struct FeedTelemetry {
    frames: AtomicU64,
    documents: AtomicU64,
    decode_errors: AtomicU64,
    records_applied: AtomicU64,
    records_discarded: AtomicU64,
    records_ignored: AtomicU64,
    status_changes: AtomicU64,
    chart_refreshes: AtomicU64,
    frame_timings: Mutex<FrameTimingWindow>,
}

impl FeedTelemetry {
    pub fn snapshot(&self) -> FeedTelemetrySnapshot {
        let timings = self.frame_timings.lock().percentiles();
        FeedTelemetrySnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            documents: self.documents.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            records_applied: self.records_applied.load(Ordering::Relaxed),
            records_discarded: self.records_discarded.load(Ordering::Relaxed),
            records_ignored: self.records_ignored.load(Ordering::Relaxed),
            status_changes: self.status_changes.load(Ordering::Relaxed),
            chart_refreshes: self.chart_refreshes.load(Ordering::Relaxed),
            frame_p50_us: timings.p50_us,
            frame_p95_us: timings.p95_us,
            frame_p99_us: timings.p99_us,
        }
    }
}

impl FeedObserver for FeedTelemetry {
    fn on_status(&self, _status: &FeedStatusSnapshot) {
        self.status_changes.fetch_add(1, Ordering::Relaxed);
    }

    fn on_frame(&self, documents: usize, elapsed_us: u32) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.documents
            .fetch_add(documents as u64, Ordering::Relaxed);
        self.frame_timings.lock().record(elapsed_us);
    }

    fn on_decode_error(&self, _error: &FeedError) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    fn on_record(&self, outcome: &ApplyOutcome) {
        let counter = match outcome {
            ApplyOutcome::Applied { .. } => &self.records_applied,
            ApplyOutcome::Discarded { .. } => &self.records_discarded,
            ApplyOutcome::Ignored { .. } => &self.records_ignored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn on_charts_refreshed(&self, _instruments: usize) {
        self.chart_refreshes.fetch_add(1, Ordering::Relaxed);
    }
}
