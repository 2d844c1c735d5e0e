use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::services::bridge_builder::BridgeReport;
use crate::services::cycle_manager::SoftLock;
use crate::services::retry::GenerationMetrics;

/// Aggregate of every wrapped generation call in a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationSummary {
    pub total_steps: usize,
    pub successful_steps: usize,
    pub total_retries: u32,
    pub total_duration: Duration,
    pub failed_steps: Vec<String>,
}

impl GenerationSummary {
    pub fn from_metrics(metrics: &[GenerationMetrics]) -> Self {
        Self {
            total_steps: metrics.len(),
            successful_steps: metrics.iter().filter(|m| m.success).count(),
            total_retries: metrics.iter().map(|m| m.retry_count).sum(),
            total_duration: metrics.iter().map(|m| m.total_duration).sum(),
            failed_steps: metrics
                .iter()
                .filter(|m| !m.success)
                .map(|m| m.step_name.clone())
                .collect(),
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_steps == 0 {
            return 1.0;
        }
        self.successful_steps as f64 / self.total_steps as f64
    }
}

/// A generation request that did not produce content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub step_name: String,
    pub situation_id: Option<String>,
    pub choice_id: Option<String>,
    pub error: String,
}

/// Why the expansion loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    QueueEmpty,
    IterationLimit,
    TimeLimit,
    Cancelled,
    AgentCompleted,
}

/// Final account of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationReport {
    pub situation_count: usize,
    pub arc_count: usize,
    pub generation_step: u32,
    pub stop_reason: Option<StopReason>,
    pub cycles_injected: usize,
    pub remaining_dangling: Vec<(String, String)>,
    pub unresolved_soft_locks: Vec<SoftLock>,
    pub unreachable: Vec<String>,
    pub soft_locks_resolved: Vec<String>,
    pub bridges: BridgeReport,
    pub failures: Vec<FailureRecord>,
    pub summary: GenerationSummary,
    pub finalize_passes: u32,
}

impl GenerationReport {
    /// No dangling choices, soft-locks or unreachable situations remain.
    pub fn is_clean(&self) -> bool {
        self.remaining_dangling.is_empty()
            && self.unresolved_soft_locks.is_empty()
            && self.unreachable.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(step: &str, success: bool, retries: u32, millis: u64) -> GenerationMetrics {
        GenerationMetrics {
            step_name: step.to_string(),
            attempts: Vec::new(),
            retry_count: retries,
            success,
            total_duration: Duration::from_millis(millis),
            error_message: None,
        }
    }

    #[test]
    fn test_summary_aggregates() {
        let summary = GenerationSummary::from_metrics(&[
            metrics("arc_seed", true, 0, 10),
            metrics("situation_1", true, 2, 30),
            metrics("situation_2", false, 2, 40),
        ]);
        assert_eq!(summary.total_steps, 3);
        assert_eq!(summary.successful_steps, 2);
        assert_eq!(summary.total_retries, 4);
        assert_eq!(summary.total_duration, Duration::from_millis(80));
        assert_eq!(summary.failed_steps, vec!["situation_2"]);
        assert!((summary.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary() {
        let summary = GenerationSummary::from_metrics(&[]);
        assert!((summary.success_rate() - 1.0).abs() < f64::EPSILON);
    }
}
