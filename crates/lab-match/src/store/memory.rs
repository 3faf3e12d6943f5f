use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::workflows::matching::{
    HistoryRecord, LabDefinition, LabId, RepositoryError, Request, RequestId, RunReader,
    RunWriter, SnapshotSource, StoredRun,
};

#[derive(Debug, Default)]
struct Nodes {
    labs: BTreeMap<LabId, LabDefinition>,
    requests: BTreeMap<String, BTreeMap<RequestId, Request>>,
    history: BTreeMap<String, BTreeMap<String, HistoryRecord>>,
    runs: BTreeMap<String, BTreeMap<i64, StoredRun>>,
}

/// In-process store with the same contracts as the file store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    nodes: Mutex<Nodes>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn nodes(&self) -> Result<MutexGuard<'_, Nodes>, RepositoryError> {
        self.nodes
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))
    }

    pub fn insert_lab(&self, id: LabId, lab: LabDefinition) -> Result<(), RepositoryError> {
        self.nodes()?.labs.insert(id, lab);
        Ok(())
    }

    pub fn insert_request(&self, node: &str, request: Request) -> Result<(), RepositoryError> {
        self.nodes()?
            .requests
            .entry(node.to_string())
            .or_default()
            .insert(request.id.clone(), request);
        Ok(())
    }

    pub fn insert_history(
        &self,
        node: &str,
        record_id: impl Into<String>,
        record: HistoryRecord,
    ) -> Result<(), RepositoryError> {
        self.nodes()?
            .history
            .entry(node.to_string())
            .or_default()
            .insert(record_id.into(), record);
        Ok(())
    }

    /// Every stored run of a node, oldest first.
    pub fn runs(&self, results_node: &str) -> Result<Vec<StoredRun>, RepositoryError> {
        Ok(self
            .nodes()?
            .runs
            .get(results_node)
            .map(|runs| runs.values().cloned().collect())
            .unwrap_or_default())
    }
}

impl SnapshotSource for InMemoryStore {
    fn fetch_lab_catalog(&self) -> Result<BTreeMap<LabId, LabDefinition>, RepositoryError> {
        Ok(self.nodes()?.labs.clone())
    }

    fn fetch_requests(&self, node: &str) -> Result<BTreeMap<RequestId, Request>, RepositoryError> {
        Ok(self.nodes()?.requests.get(node).cloned().unwrap_or_default())
    }

    fn fetch_history(&self, node: &str) -> Result<BTreeMap<String, HistoryRecord>, RepositoryError> {
        Ok(self.nodes()?.history.get(node).cloned().unwrap_or_default())
    }
}

impl RunWriter for InMemoryStore {
    fn persist_run(&self, results_node: &str, run: &StoredRun) -> Result<(), RepositoryError> {
        let mut nodes = self.nodes()?;
        let runs = nodes.runs.entry(results_node.to_string()).or_default();
        if runs.contains_key(&run.run_id) {
            return Err(RepositoryError::Conflict {
                node: results_node.to_string(),
                run_id: run.run_id,
            });
        }
        runs.insert(run.run_id, run.clone());
        Ok(())
    }
}

impl RunReader for InMemoryStore {
    fn latest_run(&self, results_node: &str) -> Result<Option<StoredRun>, RepositoryError> {
        Ok(self
            .nodes()?
            .runs
            .get(results_node)
            .and_then(|runs| runs.values().next_back().cloned()))
    }
}
