use chrono::{DateTime, Local};
use lab_match::config::MatchingSettings;
use lab_match::error::AppError;
use lab_match::store::JsonFileStore;
use lab_match::workflows::matching::{DestinationKind, MatchingService, RunConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Which destinations a command should touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum DestinationScope {
    Primary,
    Secondary,
    #[default]
    All,
}

impl DestinationScope {
    pub(crate) fn kinds(self) -> Vec<DestinationKind> {
        match self {
            DestinationScope::Primary => vec![DestinationKind::Primary],
            DestinationScope::Secondary => vec![DestinationKind::Secondary],
            DestinationScope::All => DestinationKind::ALL.to_vec(),
        }
    }
}

pub(crate) fn parse_scope(raw: &str) -> Result<DestinationScope, String> {
    if raw.trim().eq_ignore_ascii_case("all") {
        return Ok(DestinationScope::All);
    }
    match parse_destination(raw)? {
        DestinationKind::Primary => Ok(DestinationScope::Primary),
        DestinationKind::Secondary => Ok(DestinationScope::Secondary),
    }
}

pub(crate) fn parse_destination(raw: &str) -> Result<DestinationKind, String> {
    raw.parse::<DestinationKind>().map_err(|err| err.to_string())
}

pub(crate) fn parse_now(raw: &str) -> Result<DateTime<Local>, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|moment| moment.with_timezone(&Local))
        .map_err(|err| format!("failed to parse '{raw}' as an RFC 3339 timestamp ({err})"))
}

pub(crate) type FileMatchingService = MatchingService<JsonFileStore, JsonFileStore>;

/// One store handle serves as both the snapshot source and the run writer.
pub(crate) fn file_service(
    settings: &MatchingSettings,
    store_override: Option<PathBuf>,
) -> FileMatchingService {
    let path = store_override.unwrap_or_else(|| settings.store_path.clone());
    let store = Arc::new(JsonFileStore::open(path));
    MatchingService::new(store.clone(), store)
}

pub(crate) fn run_configs(
    settings: &MatchingSettings,
    kinds: &[DestinationKind],
) -> Result<Vec<RunConfig>, AppError> {
    kinds
        .iter()
        .map(|kind| settings.run_config(*kind).map_err(AppError::from))
        .collect()
}
