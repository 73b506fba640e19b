//! Progress reporting for long-running scans.

use std::time::{Duration, Instant};

use crate::model::GroupKind;

/// Minimum interval between progress callbacks; a final callback always
/// fires at completion.
pub(crate) const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Smoothing factor for the exponential moving average of the processing
/// rate.
const RATE_SMOOTHING: f64 = 0.3;

/// Running counters for the analysis stage, delivered rate-limited.
#[derive(Debug, Clone, Default)]
pub struct AnalysisProgress {
    /// Files discovered so far (may still be growing).
    pub found: usize,
    /// Files with a finished outcome (record or error).
    pub analyzed: usize,
    pub cache_hits: usize,
    pub errors: usize,
    /// Smoothed processing rate in files per second.
    pub rate: f64,
    /// Estimated time to finish the currently known backlog.
    pub eta: Option<Duration>,
}

/// Callbacks for scan progress.
///
/// The CLI collaborator implements this with progress bars, the HTTP
/// collaborator with session state updates. All methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    fn on_analysis_start(&self) {}
    fn on_analysis_progress(&self, _progress: &AnalysisProgress) {}
    fn on_analysis_complete(&self, _progress: &AnalysisProgress) {}
    fn on_grouping_start(&self, _kind: GroupKind) {}
    fn on_grouping_complete(&self, _kind: GroupKind, _groups: usize) {}
}

/// No-op reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Throttles progress emission and maintains the EMA rate / ETA.
pub(crate) struct ProgressMeter {
    last_emit: Instant,
    last_analyzed: usize,
    ema_rate: Option<f64>,
}

impl ProgressMeter {
    pub fn new() -> Self {
        ProgressMeter {
            last_emit: Instant::now(),
            last_analyzed: 0,
            ema_rate: None,
        }
    }

    /// A snapshot when the rate limit allows one, otherwise `None`.
    pub fn tick(
        &mut self,
        found: usize,
        analyzed: usize,
        cache_hits: usize,
        errors: usize,
    ) -> Option<AnalysisProgress> {
        if self.last_emit.elapsed() < PROGRESS_INTERVAL {
            return None;
        }
        Some(self.snapshot(found, analyzed, cache_hits, errors))
    }

    /// Unthrottled snapshot for the final completion callback.
    pub fn finish(
        &mut self,
        found: usize,
        analyzed: usize,
        cache_hits: usize,
        errors: usize,
    ) -> AnalysisProgress {
        self.snapshot(found, analyzed, cache_hits, errors)
    }

    fn snapshot(
        &mut self,
        found: usize,
        analyzed: usize,
        cache_hits: usize,
        errors: usize,
    ) -> AnalysisProgress {
        let elapsed = self.last_emit.elapsed().as_secs_f64();
        let batch = analyzed.saturating_sub(self.last_analyzed);
        if elapsed > 0.0 {
            let instant_rate = batch as f64 / elapsed;
            let smoothed = match self.ema_rate {
                Some(prev) => RATE_SMOOTHING * instant_rate + (1.0 - RATE_SMOOTHING) * prev,
                None => instant_rate,
            };
            self.ema_rate = Some(smoothed);
        }
        self.last_emit = Instant::now();
        self.last_analyzed = analyzed;

        let rate = self.ema_rate.unwrap_or(0.0);
        let remaining = found.saturating_sub(analyzed);
        let eta = (rate > f64::EPSILON && remaining > 0)
            .then(|| Duration::from_secs_f64(remaining as f64 / rate));

        AnalysisProgress {
            found,
            analyzed,
            cache_hits,
            errors,
            rate,
            eta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_is_rate_limited() {
        let mut meter = ProgressMeter::new();
        // Immediately after creation the interval has not elapsed.
        assert!(meter.tick(10, 1, 0, 0).is_none());
    }

    #[test]
    fn test_finish_always_emits() {
        let mut meter = ProgressMeter::new();
        let progress = meter.finish(10, 10, 4, 1);
        assert_eq!(progress.found, 10);
        assert_eq!(progress.analyzed, 10);
        assert_eq!(progress.cache_hits, 4);
        assert_eq!(progress.errors, 1);
        // Nothing remaining, so no ETA.
        assert!(progress.eta.is_none());
    }

    #[test]
    fn test_eta_present_with_backlog() {
        let mut meter = ProgressMeter::new();
        std::thread::sleep(Duration::from_millis(5));
        let progress = meter.finish(1000, 100, 0, 0);
        if progress.rate > 0.0 {
            assert!(progress.eta.is_some());
        }
    }
}
