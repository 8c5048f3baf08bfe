//! Mesh Smoke Report Types
//!
//! Defines the test report written at the end of a smoke run, the entries
//! recorded into it, and the aggregation that turns it into counts, latency
//! statistics and a pass/fail verdict.

pub mod entry;
pub mod error;
pub mod report;
pub mod summary;

pub use entry::{DeploymentRecord, DeploymentState, Entry, InferenceRecord, InferenceStatus};
pub use error::ReportError;
pub use report::{Category, TestReport};
pub use summary::{nearest_rank, CategorySummary, LatencyStats, Summary, Verdict};

/// Schema version for the persisted report.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for the persisted report.
pub const REPORT_SCHEMA_ID: &str = "mesh-smoke/test_report@1";
