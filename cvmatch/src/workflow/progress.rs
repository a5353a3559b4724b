//! Batch progress counters and periodic reporting

use crate::models::BatchProgress;
use cvmatch_common::time::format_eta;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct ProgressState {
    progress: BatchProgress,
    started: Instant,
}

/// Counters for one batch at a time, updated under a single lock
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProgressState {
                progress: BatchProgress::default(),
                started: Instant::now(),
            }),
        }
    }

    // Counters stay meaningful even if a holder panicked mid-update
    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Zero the counters and restart the clock for a new batch of `total` items
    pub fn reset(&self, total: usize) {
        let mut state = self.lock();
        state.progress = BatchProgress {
            total,
            ..BatchProgress::default()
        };
        state.started = Instant::now();
    }

    /// Count one finished item; returns the snapshot after the update
    pub fn record(&self, success: bool) -> BatchProgress {
        let mut state = self.lock();
        state.progress.processed += 1;
        if success {
            state.progress.successful += 1;
        } else {
            state.progress.failed += 1;
        }
        state.progress
    }

    pub fn snapshot(&self) -> BatchProgress {
        self.lock().progress
    }

    pub fn elapsed(&self) -> Duration {
        self.lock().started.elapsed()
    }

    /// Items per second since the batch started
    pub fn rate(&self) -> f64 {
        let state = self.lock();
        let secs = state.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            state.progress.processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Remaining time at the current rate; `None` until something finished
    pub fn eta(&self) -> Option<Duration> {
        let remaining = self.snapshot().remaining();
        let rate = self.rate();
        if rate > 0.0 {
            Some(Duration::from_secs_f64(remaining as f64 / rate))
        } else {
            None
        }
    }
}

/// Log throughput and ETA every `interval` until `stop` fires or the batch completes
pub fn spawn_reporter(
    tracker: Arc<ProgressTracker>,
    interval: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::debug!("Progress reporter started");
        let mut last_processed = 0;

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let progress = tracker.snapshot();
            if progress.processed >= progress.total {
                break;
            }
            if progress.processed == last_processed {
                continue;
            }

            let eta = tracker
                .eta()
                .map(format_eta)
                .unwrap_or_else(|| "unknown".to_string());
            tracing::info!(
                "Progress: {}/{} ({:.1}%) | Rate: {:.2} files/sec | ETA: {} | Succeeded: {} | Failed: {}",
                progress.processed,
                progress.total,
                progress.percent(),
                tracker.rate(),
                eta,
                progress.successful,
                progress.failed
            );
            last_processed = progress.processed;
        }

        tracing::debug!("Progress reporter stopped");
    })
}
