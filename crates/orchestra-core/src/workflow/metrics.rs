//! Aggregate statistics over a finished run.

use std::collections::HashMap;

use chrono::Utc;
use orchestra_types::workflow::{
    ConfidenceDistribution, ExecutionMetadata, StepResult, StepStatus, WorkflowMetrics,
};

/// Stateless metrics calculator.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Compute metrics from the recorded results and run bookkeeping.
    ///
    /// A run that has not been stamped `completed_at` is measured up to now.
    pub fn calculate(
        results: &HashMap<String, StepResult>,
        metadata: &ExecutionMetadata,
    ) -> WorkflowMetrics {
        let end = metadata.completed_at.unwrap_or_else(Utc::now);
        let total_ms = (end - metadata.started_at).num_milliseconds().max(0) as u64;

        let durations: Vec<u64> = results.values().filter_map(|r| r.duration_ms).collect();
        let duration_sum: u64 = durations.iter().sum();
        let non_zero: Vec<u64> = durations.into_iter().filter(|d| *d > 0).collect();

        let avg_step_execution_time_ms = if non_zero.is_empty() {
            0.0
        } else {
            non_zero.iter().sum::<u64>() as f64 / non_zero.len() as f64
        };

        let parallelization_efficiency = if duration_sum == 0 {
            1.0
        } else {
            total_ms as f64 / duration_sum as f64
        };

        let scores: Vec<f64> = results.values().filter_map(StepResult::confidence).collect();

        WorkflowMetrics {
            total_execution_time_ms: total_ms,
            avg_step_execution_time_ms,
            parallelization_efficiency,
            success_rate: Self::success_rate(results),
            confidence_distribution: Self::confidence_distribution(&scores),
        }
    }

    /// Completed results over all recorded results; steps never reached don't count.
    pub fn success_rate(results: &HashMap<String, StepResult>) -> f64 {
        if results.is_empty() {
            return 0.0;
        }
        let completed = results
            .values()
            .filter(|r| r.status == StepStatus::Completed)
            .count();
        completed as f64 / results.len() as f64
    }

    pub fn confidence_distribution(scores: &[f64]) -> ConfidenceDistribution {
        if scores.is_empty() {
            return ConfidenceDistribution::default();
        }
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = scores.iter().sum::<f64>() / scores.len() as f64;
        ConfidenceDistribution {
            min,
            max,
            avg,
            median: Self::median(scores),
            count: scores.len(),
        }
    }

    /// Median; the mean of the two middle values for even counts, 0 when empty.
    pub fn median(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        }
    }
}
