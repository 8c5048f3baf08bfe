//! Report aggregation: per-category counts, latency statistics, verdict.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::report::{Category, TestReport};

/// Counts for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub total: usize,
    pub succeeded: usize,
}

impl CategorySummary {
    /// Fraction of entries that succeeded; 0.0 for an empty category
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

/// Latency statistics over the performance category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Number of latency samples (successful requests)
    pub samples: usize,
    pub mean_ms: f64,
    pub p95_ms: f64,
}

impl LatencyStats {
    /// Compute statistics from raw samples; None when there are none
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let mean_ms = sorted.iter().sum::<f64>() / sorted.len() as f64;
        let p95_ms = nearest_rank(&sorted, 95)?;

        Some(Self {
            samples: sorted.len(),
            mean_ms,
            p95_ms,
        })
    }
}

/// Nearest-rank percentile over an ascending slice.
///
/// The index is `floor(len * percentile / 100)`, clamped to the last
/// element. No interpolation.
pub fn nearest_rank(sorted: &[f64], percentile: u32) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let index = (sorted.len() * percentile as usize) / 100;
    Some(sorted[index.min(sorted.len() - 1)])
}

/// Aggregated view of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub categories: BTreeMap<Category, CategorySummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyStats>,
}

impl Summary {
    /// Aggregate a report. Pure read; the report is not modified.
    pub fn from_report(report: &TestReport) -> Self {
        let categories = Category::ALL
            .iter()
            .map(|category| {
                let mut counts = CategorySummary::default();
                for (_, entry) in report.entries(*category) {
                    counts.total += 1;
                    if entry.is_success() {
                        counts.succeeded += 1;
                    }
                }
                (*category, counts)
            })
            .collect();

        let samples: Vec<f64> = report
            .entries(Category::Performance)
            .filter_map(|(_, entry)| entry.latency_ms())
            .collect();

        Self {
            categories,
            latency: LatencyStats::from_samples(&samples),
        }
    }

    pub fn category(&self, category: Category) -> CategorySummary {
        self.categories.get(&category).copied().unwrap_or_default()
    }

    /// Decide the overall outcome.
    ///
    /// Passing requires infrastructure passes strictly above
    /// `total * min_infrastructure_pass_rate`, and at least one working model
    /// and one working pipeline.
    pub fn verdict(&self, min_infrastructure_pass_rate: f64) -> Verdict {
        let infra = self.category(Category::Infrastructure);
        let models = self.category(Category::Models);
        let pipelines = self.category(Category::Pipelines);

        let mut reasons = Vec::new();

        if infra.succeeded as f64 <= infra.total as f64 * min_infrastructure_pass_rate {
            reasons.push(format!(
                "infrastructure {}/{} passed (needs more than {:.0}%)",
                infra.succeeded,
                infra.total,
                min_infrastructure_pass_rate * 100.0
            ));
        }
        if models.succeeded == 0 {
            reasons.push("no working models".to_string());
        }
        if pipelines.succeeded == 0 {
            reasons.push("no working pipelines".to_string());
        }

        Verdict {
            passed: reasons.is_empty(),
            reasons,
        }
    }

    /// Console lines, one per category with entries plus a latency line
    pub fn human_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        for category in Category::ALL {
            let counts = self.category(category);
            let verb = match category {
                Category::Infrastructure => "passed",
                Category::Deployments => "deployed",
                Category::Models | Category::Pipelines => "working",
                Category::Performance => "succeeded",
            };
            if counts.total > 0 || matches!(category, Category::Models | Category::Pipelines) {
                lines.push(format!(
                    "{}: {}/{} {}",
                    category.label(),
                    counts.succeeded,
                    counts.total,
                    verb
                ));
            }
        }

        if let Some(latency) = self.latency {
            lines.push(format!(
                "Latency: {:.1}ms avg, {:.1}ms p95 over {} requests",
                latency.mean_ms, latency.p95_ms, latency.samples
            ));
        }

        lines
    }
}

/// Overall pass/fail decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    /// Why the run failed; empty when it passed
    pub reasons: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{DeploymentRecord, DeploymentState, InferenceRecord};

    #[test]
    fn test_nearest_rank_p95_of_ten() {
        let samples: Vec<f64> = (1..=10).map(|i| (i * 10) as f64).collect();
        assert_eq!(nearest_rank(&samples, 95), Some(100.0));
    }

    #[test]
    fn test_nearest_rank_edges() {
        assert_eq!(nearest_rank(&[], 95), None);
        assert_eq!(nearest_rank(&[42.0], 95), Some(42.0));

        let twenty: Vec<f64> = (0..20).map(|i| i as f64).collect();
        // floor(20 * 0.95) = 19
        assert_eq!(nearest_rank(&twenty, 95), Some(19.0));
        assert_eq!(nearest_rank(&twenty, 50), Some(10.0));
    }

    #[test]
    fn test_latency_stats_sorts_input() {
        let stats = LatencyStats::from_samples(&[30.0, 10.0, 20.0]).unwrap();
        assert_eq!(stats.samples, 3);
        assert_eq!(stats.mean_ms, 20.0);
        assert_eq!(stats.p95_ms, 30.0);
    }

    #[test]
    fn test_counts_match_success_markers() {
        let mut report = TestReport::new("run-1", "seldon-mesh");
        report.record_check("kubectl", true);
        report.record_check("istio", false);
        report.record_inference(Category::Models, "a", InferenceRecord::success(5.0));
        report.record_inference(Category::Models, "b", InferenceRecord::http_failure(503, None));
        report.record_inference(Category::Models, "c", InferenceRecord::transport_error("timeout"));
        report.record_deployment("m", DeploymentRecord::without_poll(DeploymentState::Failed));

        let summary = report.summarize();

        assert_eq!(
            summary.category(Category::Infrastructure),
            CategorySummary { total: 2, succeeded: 1 }
        );
        assert_eq!(
            summary.category(Category::Models),
            CategorySummary { total: 3, succeeded: 1 }
        );
        assert_eq!(
            summary.category(Category::Deployments),
            CategorySummary { total: 1, succeeded: 0 }
        );
        assert_eq!(summary.category(Category::Pipelines), CategorySummary::default());
    }

    #[test]
    fn test_overwrite_does_not_double_count() {
        let mut report = TestReport::new("run-1", "seldon-mesh");
        report.record_inference(Category::Models, "a", InferenceRecord::http_failure(500, None));
        report.record_inference(Category::Models, "a", InferenceRecord::success(3.0));

        let models = report.summarize().category(Category::Models);
        assert_eq!(models.total, 1);
        assert_eq!(models.succeeded, 1);
    }

    #[test]
    fn test_summarize_is_pure() {
        let mut report = TestReport::new("run-1", "seldon-mesh");
        report.record_inference(Category::Performance, "request-01", InferenceRecord::success(10.0));
        let before = report.clone();

        let _ = report.summarize();
        let _ = report.summarize();

        assert_eq!(report, before);
    }

    #[test]
    fn test_latency_only_from_successes() {
        let mut report = TestReport::new("run-1", "seldon-mesh");
        for i in 1..=10 {
            report.record_inference(
                Category::Performance,
                format!("request-{:02}", i),
                InferenceRecord::success((i * 10) as f64),
            );
        }
        report.record_inference(
            Category::Performance,
            "request-11",
            InferenceRecord::http_failure(503, None),
        );

        let summary = report.summarize();
        let latency = summary.latency.unwrap();

        assert_eq!(latency.samples, 10);
        assert_eq!(latency.mean_ms, 55.0);
        assert_eq!(latency.p95_ms, 100.0);
        assert_eq!(
            summary.category(Category::Performance),
            CategorySummary { total: 11, succeeded: 10 }
        );
    }

    #[test]
    fn test_verdict_passes() {
        let mut report = TestReport::new("run-1", "seldon-mesh");
        for check in ["kubectl", "seldon_crds", "namespace", "istio", "server_mlserver"] {
            report.record_check(check, true);
        }
        report.record_inference(Category::Models, "iris", InferenceRecord::success(5.0));
        report.record_inference(Category::Pipelines, "p", InferenceRecord::success(7.0));

        let verdict = report.summarize().verdict(0.8);
        assert!(verdict.passed);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_verdict_infrastructure_at_threshold_fails() {
        let mut report = TestReport::new("run-1", "seldon-mesh");
        for check in ["a", "b", "c", "d"] {
            report.record_check(check, true);
        }
        report.record_check("e", false);
        report.record_inference(Category::Models, "iris", InferenceRecord::success(5.0));
        report.record_inference(Category::Pipelines, "p", InferenceRecord::success(7.0));

        // 4/5 = 80% is not strictly above 80%
        let verdict = report.summarize().verdict(0.8);
        assert!(!verdict.passed);
        assert_eq!(verdict.reasons.len(), 1);
        assert!(verdict.reasons[0].contains("infrastructure 4/5"));
    }

    #[test]
    fn test_verdict_requires_model_and_pipeline() {
        let mut report = TestReport::new("run-1", "seldon-mesh");
        report.record_check("kubectl", true);

        let verdict = report.summarize().verdict(0.8);
        assert!(!verdict.passed);
        assert!(verdict.reasons.contains(&"no working models".to_string()));
        assert!(verdict.reasons.contains(&"no working pipelines".to_string()));
    }

    #[test]
    fn test_empty_infrastructure_fails() {
        let report = TestReport::new("run-1", "seldon-mesh");
        let verdict = report.summarize().verdict(0.8);
        assert!(!verdict.passed);
    }

    #[test]
    fn test_human_lines() {
        let mut report = TestReport::new("run-1", "seldon-mesh");
        report.record_check("kubectl", true);
        report.record_inference(Category::Models, "iris", InferenceRecord::success(5.0));
        report.record_inference(Category::Performance, "request-01", InferenceRecord::success(5.0));

        let lines = report.summarize().human_lines();
        assert_eq!(lines[0], "Infrastructure: 1/1 passed");
        assert_eq!(lines[1], "Models: 1/1 working");
        assert_eq!(lines[2], "Pipelines: 0/0 working");
        assert_eq!(lines[3], "Performance: 1/1 succeeded");
        assert_eq!(lines[4], "Latency: 5.0ms avg, 5.0ms p95 over 1 requests");
    }
}
