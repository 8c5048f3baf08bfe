//! Test report (test_report.json)
//!
//! The report is created once at the start of a run, passed by `&mut` to
//! every phase, and serialized when the run ends. Entries are keyed by
//! category and then by target name; recording the same pair twice
//! overwrites the earlier entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::entry::{DeploymentRecord, Entry, InferenceRecord};
use crate::error::ReportError;
use crate::summary::Summary;
use crate::{REPORT_SCHEMA_ID, REPORT_SCHEMA_VERSION};

/// Report category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Cluster CLI, CRDs, namespaces, servers, experiments
    Infrastructure,
    /// Resources applied by the deployer
    Deployments,
    /// Per-model inference checks
    Models,
    /// Per-pipeline inference checks
    Pipelines,
    /// Repeated requests against a single model
    Performance,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Infrastructure,
        Category::Deployments,
        Category::Models,
        Category::Pipelines,
        Category::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Infrastructure => "infrastructure",
            Category::Deployments => "deployments",
            Category::Models => "models",
            Category::Pipelines => "pipelines",
            Category::Performance => "performance",
        }
    }

    /// Capitalized label for console output
    pub fn label(&self) -> &'static str {
        match self {
            Category::Infrastructure => "Infrastructure",
            Category::Deployments => "Deployments",
            Category::Models => "Models",
            Category::Pipelines => "Pipelines",
            Category::Performance => "Performance",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Test report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// Run identifier
    pub run_id: String,

    /// Namespace the checks ran against
    pub namespace: String,

    /// Gateway address used for inference calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    /// When the run started
    pub created_at: DateTime<Utc>,

    /// When the run was finalized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// category -> target -> entry
    pub results: BTreeMap<Category, BTreeMap<String, Entry>>,
}

impl TestReport {
    /// Create an empty report with every category present
    pub fn new(run_id: impl Into<String>, namespace: impl Into<String>) -> Self {
        let results = Category::ALL
            .iter()
            .map(|category| (*category, BTreeMap::new()))
            .collect();

        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            schema_id: REPORT_SCHEMA_ID.to_string(),
            run_id: run_id.into(),
            namespace: namespace.into(),
            gateway: None,
            created_at: Utc::now(),
            finished_at: None,
            results,
        }
    }

    /// Record an entry, returning the one it replaced, if any
    pub fn record(
        &mut self,
        category: Category,
        target: impl Into<String>,
        entry: impl Into<Entry>,
    ) -> Option<Entry> {
        self.results
            .entry(category)
            .or_default()
            .insert(target.into(), entry.into())
    }

    pub fn record_check(&mut self, target: impl Into<String>, passed: bool) -> Option<Entry> {
        self.record(Category::Infrastructure, target, passed)
    }

    pub fn record_inference(
        &mut self,
        category: Category,
        target: impl Into<String>,
        record: InferenceRecord,
    ) -> Option<Entry> {
        self.record(category, target, record)
    }

    pub fn record_deployment(
        &mut self,
        target: impl Into<String>,
        record: DeploymentRecord,
    ) -> Option<Entry> {
        self.record(Category::Deployments, target, record)
    }

    /// Entries of one category (empty if none recorded)
    pub fn entries(&self, category: Category) -> impl Iterator<Item = (&String, &Entry)> {
        self.results.get(&category).into_iter().flat_map(|m| m.iter())
    }

    pub fn get(&self, category: Category, target: &str) -> Option<&Entry> {
        self.results.get(&category).and_then(|m| m.get(target))
    }

    /// True when every infrastructure check recorded so far passed
    pub fn infrastructure_ok(&self) -> bool {
        self.entries(Category::Infrastructure).all(|(_, e)| e.is_success())
    }

    pub fn set_gateway(&mut self, gateway: impl Into<String>) {
        self.gateway = Some(gateway.into());
    }

    /// Stamp the finish time. Recording after this is still allowed.
    pub fn finalize(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Compute counts and latency statistics without touching the report
    pub fn summarize(&self) -> Summary {
        Summary::from_report(self)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Write to file
    pub fn write_to_file(&self, path: &Path) -> Result<(), ReportError> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from file
    pub fn from_file(path: &Path) -> Result<Self, ReportError> {
        let json = fs::read_to_string(path).map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_json(&json)?)
    }
}
