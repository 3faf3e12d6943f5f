use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::DestinationKind;
use super::domain::{AssignmentRecord, HistoryRecord, LabDefinition, LabId, Request, RequestId};

/// Read side of the upstream store. One call per node, once per run.
pub trait SnapshotSource: Send + Sync {
    fn fetch_lab_catalog(&self) -> Result<BTreeMap<LabId, LabDefinition>, RepositoryError>;
    fn fetch_requests(&self, node: &str) -> Result<BTreeMap<RequestId, Request>, RepositoryError>;
    fn fetch_history(&self, node: &str) -> Result<BTreeMap<String, HistoryRecord>, RepositoryError>;
}

/// Append-only sink for finished runs.
pub trait RunWriter: Send + Sync {
    /// Must fail with [`RepositoryError::Conflict`] rather than overwrite an existing run.
    fn persist_run(&self, results_node: &str, run: &StoredRun) -> Result<(), RepositoryError>;
}

/// Access to previously persisted runs.
pub trait RunReader: Send + Sync {
    fn latest_run(&self, results_node: &str) -> Result<Option<StoredRun>, RepositoryError>;
}

/// A persisted run: metadata plus every record it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    /// Epoch milliseconds of the run clock.
    pub run_id: i64,
    pub meta: RunMeta,
    pub records: Vec<AssignmentRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMeta {
    pub created_at: DateTime<Utc>,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<DestinationKind>,
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("run {run_id} already exists under {node}")]
    Conflict { node: String, run_id: i64 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("node {node} is malformed: {reason}")]
    Corrupt { node: String, reason: String },
}
