use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::rows::{node_entries, run_from_node, run_to_node, HistoryRow, LabRow, RequestRow};
use crate::workflows::matching::{
    HistoryRecord, LabDefinition, LabId, RepositoryError, Request, RequestId, RunReader,
    RunWriter, SnapshotSource, StoredRun, LABS_NODE,
};

/// A JSON document whose top-level keys are node names.
///
/// Writes go through a temporary file and a rename so readers never see half a document.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Map<String, Value>, RepositoryError> {
        let raw = fs::read_to_string(&self.path).map_err(|err| {
            RepositoryError::Unavailable(format!("{}: {err}", self.path.display()))
        })?;
        parse_document(&raw)
    }

    /// Like `read_document`, but a missing file is an empty document.
    fn read_or_empty(&self) -> Result<Map<String, Value>, RepositoryError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => parse_document(&raw),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Map::new()),
            Err(err) => Err(RepositoryError::Unavailable(format!(
                "{}: {err}",
                self.path.display()
            ))),
        }
    }

    fn write_document(&self, document: &Map<String, Value>) -> Result<(), RepositoryError> {
        let unavailable =
            |err: std::io::Error| RepositoryError::Unavailable(format!("{}: {err}", self.path.display()));

        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(unavailable)?;
        }
        let body = serde_json::to_vec_pretty(document).map_err(|err| {
            RepositoryError::Unavailable(format!("unable to encode document: {err}"))
        })?;

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        fs::write(&staging, body).map_err(unavailable)?;
        fs::rename(&staging, &self.path).map_err(unavailable)?;
        Ok(())
    }

    fn read_rows<T: DeserializeOwned>(&self, node: &str) -> Result<Vec<(String, T)>, RepositoryError> {
        let document = self.read_document()?;
        let mut rows = Vec::new();
        for (key, value) in node_entries(document.get(node)) {
            match serde_json::from_value::<T>(value.clone()) {
                Ok(row) => rows.push((key, row)),
                Err(err) => warn!(node, key = %key, error = %err, "skipping unreadable row"),
            }
        }
        debug!(node, rows = rows.len(), "node read");
        Ok(rows)
    }
}

fn parse_document(raw: &str) -> Result<Map<String, Value>, RepositoryError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(RepositoryError::Corrupt {
            node: "/".to_string(),
            reason: "document root is not an object".to_string(),
        }),
        Err(err) => Err(RepositoryError::Corrupt {
            node: "/".to_string(),
            reason: err.to_string(),
        }),
    }
}

impl SnapshotSource for JsonFileStore {
    fn fetch_lab_catalog(&self) -> Result<BTreeMap<LabId, LabDefinition>, RepositoryError> {
        Ok(self
            .read_rows::<LabRow>(LABS_NODE)?
            .into_iter()
            .map(|(key, row)| (LabId(key), row.into_definition()))
            .collect())
    }

    fn fetch_requests(&self, node: &str) -> Result<BTreeMap<RequestId, Request>, RepositoryError> {
        Ok(self
            .read_rows::<RequestRow>(node)?
            .into_iter()
            .map(|(key, row)| {
                let request = row.into_request(&key);
                (request.id.clone(), request)
            })
            .collect())
    }

    fn fetch_history(&self, node: &str) -> Result<BTreeMap<String, HistoryRecord>, RepositoryError> {
        Ok(self
            .read_rows::<HistoryRow>(node)?
            .into_iter()
            .map(|(key, row)| (key, row.into_record()))
            .collect())
    }
}

impl RunWriter for JsonFileStore {
    fn persist_run(&self, results_node: &str, run: &StoredRun) -> Result<(), RepositoryError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store lock poisoned".to_string()))?;

        let mut document = self.read_or_empty()?;
        let runs = document
            .entry(results_node.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(runs) = runs else {
            return Err(RepositoryError::Corrupt {
                node: results_node.to_string(),
                reason: "results node is not an object".to_string(),
            });
        };

        let key = run.run_id.to_string();
        if runs.contains_key(&key) {
            return Err(RepositoryError::Conflict {
                node: results_node.to_string(),
                run_id: run.run_id,
            });
        }
        let node = run_to_node(run).map_err(|err| {
            RepositoryError::Unavailable(format!("unable to encode run: {err}"))
        })?;
        runs.insert(key, node);

        self.write_document(&document)
    }
}

impl RunReader for JsonFileStore {
    fn latest_run(&self, results_node: &str) -> Result<Option<StoredRun>, RepositoryError> {
        let document = self.read_or_empty()?;
        let Some(Value::Object(runs)) = document.get(results_node) else {
            return Ok(None);
        };

        let latest = runs
            .iter()
            .filter_map(|(key, node)| key.parse::<i64>().ok().map(|run_id| (run_id, node)))
            .max_by_key(|(run_id, _)| *run_id);

        match latest {
            Some((run_id, node)) => run_from_node(run_id, node)
                .map(Some)
                .map_err(|reason| RepositoryError::Corrupt {
                    node: results_node.to_string(),
                    reason,
                }),
            None => Ok(None),
        }
    }
}
