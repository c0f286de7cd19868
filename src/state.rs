//! # Application State Management
//!
//! Process-wide state built once at startup and shared by every request handler.
//!
//! ## What lives here:
//! - **Configuration**: read-only after startup, so a plain `Arc<AppConfig>` is enough
//! - **Scratch directory**: where per-request input/output files go (injected, so tests
//!   can point it at a throwaway directory)
//! - **Metrics**: counters updated by every request, behind `Arc<RwLock<...>>`
//!
//! ## Arc<RwLock<T>> Pattern
//! - **Arc**: every worker thread's copy of `AppState` points at the same metrics
//! - **RwLock**: many concurrent readers (`/metrics`) or one writer (a finishing request)
//!
//! Requests never share anything else: each anonymization job works on its own
//! uniquely-named scratch files.

use crate::config::AppConfig;
use crate::scratch::ScratchDir;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// The main application state that's shared across all HTTP request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Configuration as loaded at startup
    pub config: Arc<AppConfig>,

    /// Directory for per-request scratch files
    pub scratch: ScratchDir,

    /// Request and job counters (constantly being updated by requests)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started (never changes, so no lock needed)
    pub start_time: Instant,
}

/// Counters collected across all HTTP requests.
///
/// ## Why these metrics matter:
/// - **request_count / error_count**: overall load and reliability
/// - **active_jobs**: anonymizations currently running on the blocking pool
/// - **jobs_completed / jobs_failed / total_processing_ms**: pipeline health and cost
/// - **endpoint_metrics**: per-route latency and error rates
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of 4xx/5xx responses since server start
    pub error_count: u64,

    /// Anonymization jobs currently in progress
    pub active_jobs: u32,

    /// Jobs that produced an output file
    pub jobs_completed: u64,

    /// Jobs that reached the pipeline and failed there
    pub jobs_failed: u64,

    /// Wall-clock time spent inside the pipeline, summed over all jobs
    pub total_processing_ms: u64,

    /// Key: endpoint name (e.g., "POST /anonymize")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for a single endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    /// Create the shared state; the scratch directory comes from the configuration.
    pub fn new(config: AppConfig) -> Self {
        let scratch = ScratchDir::new(config.scratch_dir());
        Self::with_scratch(config, scratch)
    }

    /// Create the shared state with an explicitly chosen scratch directory.
    pub fn with_scratch(config: AppConfig, scratch: ScratchDir) -> Self {
        Self {
            config: Arc::new(config),
            scratch,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Read access to the metrics.
    ///
    /// A poisoned lock only means another thread panicked mid-update; the counters are
    /// still usable, so the guard is recovered instead of propagating the panic.
    fn metrics_read(&self) -> RwLockReadGuard<'_, AppMetrics> {
        self.metrics.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn metrics_write(&self) -> RwLockWriteGuard<'_, AppMetrics> {
        self.metrics.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        self.metrics_write().request_count += 1;
    }

    /// Increment the total error counter (any 4xx or 5xx response).
    pub fn increment_error_count(&self) {
        self.metrics_write().error_count += 1;
    }

    /// Record latency and outcome for a specific endpoint.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics_write();

        // Get or create metrics for this specific endpoint
        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Mark an anonymization job as started.
    ///
    /// The returned guard closes the job exactly once: explicitly through
    /// [`JobGuard::finish`], or as a failure when it is dropped unfinished (a panic in
    /// the pipeline, or a worker task that never ran).
    pub fn start_job(&self) -> JobGuard {
        self.metrics_write().active_jobs += 1;
        JobGuard {
            state: self.clone(),
            started: Instant::now(),
            finished: false,
        }
    }

    /// Record a job outcome.
    ///
    /// ## Underflow protection:
    /// `active_jobs` is only decremented when positive, so a mismatched call can never
    /// wrap the counter around.
    fn job_finished(&self, success: bool, duration_ms: u64) {
        let mut metrics = self.metrics_write();
        if metrics.active_jobs > 0 {
            metrics.active_jobs -= 1;
        }
        if success {
            metrics.jobs_completed += 1;
        } else {
            metrics.jobs_failed += 1;
        }
        metrics.total_processing_ms += duration_ms;
    }

    /// Get a consistent copy of the metrics (the lock is released before returning).
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics_read().clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

/// One running anonymization job, counted in `active_jobs` until it is closed.
///
/// The guard travels with the work itself (into the blocking closure), so the job is
/// closed when the pipeline actually stops, even if the request that started it was
/// abandoned in the meantime.
#[derive(Debug)]
pub struct JobGuard {
    state: AppState,
    started: Instant,
    finished: bool,
}

impl JobGuard {
    /// Close the job with the given outcome; returns its duration in milliseconds.
    pub fn finish(mut self, success: bool) -> u64 {
        self.finished = true;
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        self.state.job_finished(success, elapsed_ms);
        elapsed_ms
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        if !self.finished {
            let elapsed_ms = self.started.elapsed().as_millis() as u64;
            self.state.job_finished(false, elapsed_ms);
        }
    }
}

impl AppMetrics {
    /// Fraction of requests that ended in an error (0.0 when there were none).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Mean pipeline time over finished jobs.
    pub fn average_processing_ms(&self) -> f64 {
        let finished = self.jobs_completed + self.jobs_failed;
        if finished > 0 {
            self.total_processing_ms as f64 / finished as f64
        } else {
            0.0
        }
    }
}

impl EndpointMetric {
    /// Average = Total Duration ÷ Number of Requests
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0  // No requests yet, so no average to calculate
        }
    }

    /// Error Rate = Number of Errors ÷ Total Requests
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_uses_configured_scratch_dir() {
        let mut config = AppConfig::default();
        config.storage.scratch_dir = "/srv/anon-scratch".to_string();

        let state = AppState::new(config);
        assert_eq!(state.scratch.path(), std::path::Path::new("/srv/anon-scratch"));
    }

    #[test]
    fn test_request_and_error_counters() {
        let state = AppState::new(AppConfig::default());
        state.increment_request_count();
        state.increment_request_count();
        state.increment_error_count();

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.request_count, 2);
        assert_eq!(metrics.error_count, 1);
        assert!((metrics.error_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_endpoint_metrics() {
        let state = AppState::new(AppConfig::default());
        state.record_endpoint_request("POST /anonymize", 120, false);
        state.record_endpoint_request("POST /anonymize", 80, true);

        let metrics = state.get_metrics_snapshot();
        let endpoint = &metrics.endpoint_metrics["POST /anonymize"];
        assert_eq!(endpoint.request_count, 2);
        assert_eq!(endpoint.error_count, 1);
        assert!((endpoint.average_duration_ms() - 100.0).abs() < f64::EPSILON);
        assert!((endpoint.error_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_job_lifecycle() {
        let state = AppState::new(AppConfig::default());
        let first = state.start_job();
        let second = state.start_job();
        assert_eq!(state.get_metrics_snapshot().active_jobs, 2);

        first.finish(true);
        second.finish(false);

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.active_jobs, 0);
        assert_eq!(metrics.jobs_completed, 1);
        assert_eq!(metrics.jobs_failed, 1);
    }

    #[test]
    fn test_unfinished_job_counts_as_failed() {
        let state = AppState::new(AppConfig::default());
        {
            let _job = state.start_job();
            assert_eq!(state.get_metrics_snapshot().active_jobs, 1);
        }

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.active_jobs, 0);
        assert_eq!(metrics.jobs_completed, 0);
        assert_eq!(metrics.jobs_failed, 1);
    }

    #[test]
    fn test_finished_job_is_not_counted_twice() {
        let state = AppState::new(AppConfig::default());
        state.start_job().finish(true);
        // A stray finish on an idle state must not underflow
        state.job_finished(false, 0);

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.active_jobs, 0);
        assert_eq!(metrics.jobs_completed, 1);
        assert_eq!(metrics.jobs_failed, 1);
    }

    #[test]
    fn test_average_processing_time() {
        let state = AppState::new(AppConfig::default());
        state.job_finished(true, 300);
        state.job_finished(false, 100);

        let metrics = state.get_metrics_snapshot();
        assert!((metrics.average_processing_ms() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_clones_share_metrics() {
        let state = AppState::new(AppConfig::default());
        let clone = state.clone();
        clone.increment_request_count();
        assert_eq!(state.get_metrics_snapshot().request_count, 1);
    }
}
