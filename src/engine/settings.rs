use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::gate::DEFAULT_WORKER_CEILING;
use super::retry::RetryPolicy;
use crate::error::MatchError;

/// Parameters shared by every batch call site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    /// Maximum simultaneous remote calls.
    pub concurrency: usize,
    /// Maximum sustained calls per second across the batch.
    pub qps: f64,
    /// Hard deadline of one attempt.
    pub timeout_seconds: u64,
    /// Extra attempts after the first one.
    pub retries: u32,
    /// Base of the exponential backoff.
    pub backoff_seconds: f64,
    /// Upper bound on workers and permits, however large `concurrency` is.
    pub worker_ceiling: usize,
    /// Whether a structurally invalid reply is worth another attempt.
    pub retry_malformed: bool,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            concurrency: 10,
            qps: 5.0,
            timeout_seconds: 60,
            retries: 2,
            backoff_seconds: 1.0,
            worker_ceiling: DEFAULT_WORKER_CEILING,
            retry_malformed: false,
        }
    }
}

impl BatchSettings {
    pub fn cv_parsing() -> Self {
        Self {
            concurrency: 500,
            qps: 100.0,
            timeout_seconds: 200,
            retries: 2,
            backoff_seconds: 2.0,
            retry_malformed: true,
            ..Self::default()
        }
    }

    pub fn must_have() -> Self {
        Self {
            concurrency: 500,
            qps: 100.0,
            timeout_seconds: 20,
            retries: 2,
            backoff_seconds: 1.0,
            retry_malformed: false,
            ..Self::default()
        }
    }

    pub fn nice_have() -> Self {
        Self {
            concurrency: 500,
            qps: 10.0,
            timeout_seconds: 300,
            retries: 1,
            backoff_seconds: 2.0,
            retry_malformed: false,
            ..Self::default()
        }
    }

    /// The shortlist goes out as one request, so a single permit is enough.
    pub fn rerank() -> Self {
        Self {
            concurrency: 1,
            qps: 1.0,
            timeout_seconds: 120,
            retries: 2,
            backoff_seconds: 2.0,
            retry_malformed: true,
            ..Self::default()
        }
    }

    /// Rejects parameters no batch can run with.
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.concurrency < 1 {
            return Err(MatchError::InvalidSettings(
                "concurrency must be at least 1".into(),
            ));
        }
        if !(self.qps.is_finite() && self.qps > 0.0) {
            return Err(MatchError::InvalidSettings(format!(
                "qps must be a positive number, got {}",
                self.qps
            )));
        }
        if self.timeout_seconds < 1 {
            return Err(MatchError::InvalidSettings(
                "timeout_seconds must be at least 1".into(),
            ));
        }
        if !(self.backoff_seconds.is_finite() && self.backoff_seconds > 0.0) {
            return Err(MatchError::InvalidSettings(format!(
                "backoff_seconds must be a positive number, got {}",
                self.backoff_seconds
            )));
        }
        if self.worker_ceiling < 1 {
            return Err(MatchError::InvalidSettings(
                "worker_ceiling must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            backoff: Duration::try_from_secs_f64(self.backoff_seconds).unwrap_or(Duration::ZERO),
            timeout: self.timeout(),
            retry_malformed: self.retry_malformed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_site_defaults_are_valid() {
        for settings in [
            BatchSettings::cv_parsing(),
            BatchSettings::must_have(),
            BatchSettings::nice_have(),
            BatchSettings::rerank(),
            BatchSettings::default(),
        ] {
            settings.validate().unwrap();
            assert_eq!(settings.worker_ceiling, 128);
        }
    }

    #[test]
    fn malformed_policy_differs_by_call_site() {
        assert!(BatchSettings::cv_parsing().retry_malformed);
        assert!(BatchSettings::rerank().retry_malformed);
        assert!(!BatchSettings::must_have().retry_malformed);
        assert!(!BatchSettings::nice_have().retry_malformed);
    }

    #[test]
    fn rejects_invalid_parameters() {
        let cases = [
            BatchSettings { concurrency: 0, ..BatchSettings::default() },
            BatchSettings { qps: 0.0, ..BatchSettings::default() },
            BatchSettings { qps: -3.0, ..BatchSettings::default() },
            BatchSettings { qps: f64::NAN, ..BatchSettings::default() },
            BatchSettings { timeout_seconds: 0, ..BatchSettings::default() },
            BatchSettings { backoff_seconds: 0.0, ..BatchSettings::default() },
            BatchSettings { worker_ceiling: 0, ..BatchSettings::default() },
        ];
        for settings in cases {
            let err = settings.validate().unwrap_err();
            assert!(matches!(err, MatchError::InvalidSettings(_)), "{settings:?}");
        }
    }

    #[test]
    fn retry_policy_mirrors_settings() {
        let policy = BatchSettings::must_have().retry_policy();
        assert_eq!(policy.retries, 2);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff, Duration::from_secs(1));
        assert_eq!(policy.timeout, Duration::from_secs(20));
        assert!(!policy.retry_malformed);
    }
}
