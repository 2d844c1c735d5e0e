use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentAction, ArcSeed, RetryConfig, Situation};

/// Structural check applied to every collaborator result.
pub trait Acceptable {
    fn is_acceptable(&self) -> bool;
}

impl Acceptable for String {
    fn is_acceptable(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl<T> Acceptable for Vec<T> {
    fn is_acceptable(&self) -> bool {
        !self.is_empty()
    }
}

impl<T: Acceptable> Acceptable for Option<T> {
    fn is_acceptable(&self) -> bool {
        self.as_ref().is_some_and(Acceptable::is_acceptable)
    }
}

impl Acceptable for Situation {
    fn is_acceptable(&self) -> bool {
        !self.id.trim().is_empty() && !self.description.trim().is_empty()
    }
}

impl Acceptable for ArcSeed {
    fn is_acceptable(&self) -> bool {
        !self.title.trim().is_empty()
    }
}

impl Acceptable for AgentAction {
    fn is_acceptable(&self) -> bool {
        true
    }
}

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// Returned a value the acceptance check refused
    Rejected,
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptMetrics {
    /// 1-based
    pub attempt: u32,
    pub latency: Duration,
    pub outcome: AttemptOutcome,
}

/// Timing and outcome record of one wrapped generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationMetrics {
    pub step_name: String,
    pub attempts: Vec<AttemptMetrics>,
    pub retry_count: u32,
    pub success: bool,
    pub total_duration: Duration,
    pub error_message: Option<String>,
}

impl GenerationMetrics {
    fn new(step_name: &str) -> Self {
        Self {
            step_name: step_name.to_string(),
            attempts: Vec::new(),
            retry_count: 0,
            success: false,
            total_duration: Duration::ZERO,
            error_message: None,
        }
    }

    pub fn attempt_count(&self) -> u32 {
        u32::try_from(self.attempts.len()).unwrap_or(u32::MAX)
    }
}

/// Result of a wrapped call.
#[derive(Debug)]
pub enum GenerationOutcome<T> {
    Success { value: T, metrics: GenerationMetrics },
    /// A non-transient error stopped the call early
    Failed {
        error: DomainError,
        metrics: GenerationMetrics,
    },
    /// Every attempt failed or was rejected
    Exhausted { metrics: GenerationMetrics },
}

impl<T> GenerationOutcome<T> {
    pub fn metrics(&self) -> &GenerationMetrics {
        match self {
            Self::Success { metrics, .. }
            | Self::Failed { metrics, .. }
            | Self::Exhausted { metrics } => metrics,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Split into the value (or error) and the metrics.
    pub fn into_parts(self) -> (DomainResult<T>, GenerationMetrics) {
        match self {
            Self::Success { value, metrics } => (Ok(value), metrics),
            Self::Failed { error, metrics } => (Err(error), metrics),
            Self::Exhausted { metrics } => {
                let error = DomainError::GenerationExhausted {
                    step_name: metrics.step_name.clone(),
                    attempts: metrics.attempt_count(),
                    last_error: metrics
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                };
                (Err(error), metrics)
            }
        }
    }

    pub fn into_result(self) -> DomainResult<T> {
        self.into_parts().0
    }
}

/// Bounded retry with exponential backoff and per-attempt metrics
///
/// Backoff doubles after each failed attempt, capped at `max_backoff`, and is
/// never applied after the last attempt. Only transient errors and rejected
/// values are retried.
#[derive(Debug, Clone)]
pub struct RetryMetricsWrapper {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryMetricsWrapper {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryMetricsWrapper {
    pub fn new(max_attempts: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms.max(initial_backoff_ms)),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff_schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Delays that would be slept between attempts, in order.
    pub fn planned_backoffs(&self) -> Vec<Duration> {
        let mut schedule = self.backoff_schedule();
        (1..self.max_attempts)
            .map(|_| schedule.next_backoff().unwrap_or(self.max_backoff))
            .collect()
    }

    /// Run `operation`, accepting values through their [`Acceptable`] impl.
    pub async fn execute<F, Fut, T>(&self, step_name: &str, operation: F) -> GenerationOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DomainResult<T>>,
        T: Acceptable,
    {
        self.execute_with(step_name, operation, T::is_acceptable)
            .await
    }

    /// Run `operation` with an explicit acceptance predicate.
    pub async fn execute_with<F, Fut, T, P>(
        &self,
        step_name: &str,
        mut operation: F,
        accept: P,
    ) -> GenerationOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = DomainResult<T>>,
        P: Fn(&T) -> bool,
    {
        let started = Instant::now();
        let mut metrics = GenerationMetrics::new(step_name);
        let mut schedule = self.backoff_schedule();

        for attempt in 1..=self.max_attempts {
            let attempt_started = Instant::now();
            let result = operation().await;
            let latency = attempt_started.elapsed();

            match result {
                Ok(value) if accept(&value) => {
                    metrics.attempts.push(AttemptMetrics {
                        attempt,
                        latency,
                        outcome: AttemptOutcome::Success,
                    });
                    metrics.success = true;
                    metrics.retry_count = attempt - 1;
                    metrics.total_duration = started.elapsed();
                    info!(
                        step = step_name,
                        attempt,
                        latency_ms = latency.as_millis() as u64,
                        "generation succeeded"
                    );
                    return GenerationOutcome::Success { value, metrics };
                }
                Ok(_) => {
                    warn!(step = step_name, attempt, "generation returned an unacceptable value");
                    metrics.attempts.push(AttemptMetrics {
                        attempt,
                        latency,
                        outcome: AttemptOutcome::Rejected,
                    });
                    metrics.error_message = Some("value failed acceptance check".to_string());
                }
                Err(err) if err.is_transient() => {
                    warn!(step = step_name, attempt, error = %err, "generation attempt failed");
                    metrics.attempts.push(AttemptMetrics {
                        attempt,
                        latency,
                        outcome: AttemptOutcome::Failed(err.to_string()),
                    });
                    metrics.error_message = Some(err.to_string());
                }
                Err(err) => {
                    debug!(step = step_name, attempt, error = %err, "permanent error, not retrying");
                    metrics.attempts.push(AttemptMetrics {
                        attempt,
                        latency,
                        outcome: AttemptOutcome::Failed(err.to_string()),
                    });
                    metrics.retry_count = attempt - 1;
                    metrics.error_message = Some(err.to_string());
                    metrics.total_duration = started.elapsed();
                    return GenerationOutcome::Failed {
                        error: err,
                        metrics,
                    };
                }
            }

            if attempt < self.max_attempts {
                let delay = schedule.next_backoff().unwrap_or(self.max_backoff);
                debug!(step = step_name, attempt, delay_ms = delay.as_millis() as u64, "backing off");
                sleep(delay).await;
            }
        }

        metrics.retry_count = self.max_attempts - 1;
        metrics.total_duration = started.elapsed();
        warn!(
            step = step_name,
            attempts = self.max_attempts,
            error = metrics.error_message.as_deref().unwrap_or(""),
            "generation exhausted all attempts"
        );
        GenerationOutcome::Exhausted { metrics }
    }
}
