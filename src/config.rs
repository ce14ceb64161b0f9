use crate::{error::RestoreError, restore::ErrorClassifier};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RestoreConfig {
    pub initial_concurrency: usize,
    pub min_concurrency: usize,
    pub max_concurrency: usize,
    /// Multiplier applied to the ceiling when the error rate crosses the threshold.
    pub backoff_factor: f64,
    /// Multiplier applied to the ceiling once errors have been quiet for `recovery_interval`.
    pub recovery_factor: f64,
    pub recovery_interval: Duration,
    pub adjust_interval: Duration,
    pub error_rate_threshold: f64,
    pub window_duration: Duration,
    pub window_capacity: usize,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub status_bind_addr: Option<String>,
    pub classifier: ErrorClassifier,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            initial_concurrency: 100,
            min_concurrency: 10,
            max_concurrency: 600,
            backoff_factor: 0.5,
            recovery_factor: 1.2,
            recovery_interval: Duration::from_secs(5),
            adjust_interval: Duration::from_secs(1),
            error_rate_threshold: 0.10,
            window_duration: Duration::from_secs(10),
            window_capacity: 100,
            min_batch_size: 10,
            max_batch_size: 1000,
            status_bind_addr: None,
            classifier: ErrorClassifier::default(),
        }
    }
}

impl RestoreConfig {
    pub fn validate(&self) -> Result<(), RestoreError> {
        let fail = |msg: String| Err(RestoreError::Validation(msg));

        if self.min_concurrency == 0 {
            return fail("min concurrency must be at least 1".into());
        }
        if self.min_concurrency > self.max_concurrency {
            return fail(format!(
                "min concurrency {} exceeds max concurrency {}",
                self.min_concurrency, self.max_concurrency
            ));
        }
        if !(self.min_concurrency..=self.max_concurrency).contains(&self.initial_concurrency) {
            return fail(format!(
                "initial concurrency {} outside [{}, {}]",
                self.initial_concurrency, self.min_concurrency, self.max_concurrency
            ));
        }
        if !(self.backoff_factor > 0.0 && self.backoff_factor < 1.0) {
            return fail(format!("backoff factor {} must be in (0, 1)", self.backoff_factor));
        }
        if !(self.recovery_factor > 1.0) {
            return fail(format!("recovery factor {} must be above 1", self.recovery_factor));
        }
        if !(0.0..=1.0).contains(&self.error_rate_threshold) {
            return fail(format!(
                "error rate threshold {} must be in [0, 1]",
                self.error_rate_threshold
            ));
        }
        if self.adjust_interval.is_zero() || self.window_duration.is_zero() {
            return fail("adjust interval and window duration must be non-zero".into());
        }
        if self.window_capacity == 0 {
            return fail("error window capacity must be at least 1".into());
        }
        if self.min_batch_size == 0 || self.min_batch_size > self.max_batch_size {
            return fail(format!(
                "batch bounds [{}, {}] are invalid",
                self.min_batch_size, self.max_batch_size
            ));
        }
        Ok(())
    }
}
