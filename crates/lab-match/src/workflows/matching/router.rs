use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};

use super::config::{DestinationKind, RunConfig};
use super::repository::{RunReader, RunWriter, SnapshotSource, StoredRun};
use super::service::MatchingService;
use crate::error::AppError;
use crate::workflows::proposals::proposals_from_run;

/// Shared state behind the matching routes.
pub struct MatchingApi<S, W> {
    service: MatchingService<S, W>,
    configs: BTreeMap<DestinationKind, RunConfig>,
}

impl<S, W> MatchingApi<S, W> {
    pub fn new(service: MatchingService<S, W>, configs: Vec<RunConfig>) -> Self {
        let configs = configs
            .into_iter()
            .map(|config| (config.destination.kind, config))
            .collect();
        Self { service, configs }
    }

    fn config(&self, raw: &str) -> Result<&RunConfig, AppError> {
        raw.parse::<DestinationKind>()
            .ok()
            .and_then(|kind| self.configs.get(&kind))
            .ok_or_else(|| AppError::UnknownDestination(raw.to_string()))
    }
}

/// Router builder exposing run execution and the latest results per destination.
pub fn matching_router<S, W>(api: Arc<MatchingApi<S, W>>) -> Router
where
    S: SnapshotSource + 'static,
    W: RunWriter + RunReader + 'static,
{
    Router::new()
        .route(
            "/api/v1/matching/:destination/runs",
            post(run_handler::<S, W>),
        )
        .route(
            "/api/v1/matching/:destination/runs/latest",
            get(latest_handler::<S, W>),
        )
        .route(
            "/api/v1/matching/:destination/proposals",
            get(proposals_handler::<S, W>),
        )
        .with_state(api)
}

/// Store access blocks, so every handler hands its work to the blocking pool.
async fn on_blocking_pool<S, W, T, F>(api: &Arc<MatchingApi<S, W>>, job: F) -> Result<T, AppError>
where
    S: SnapshotSource + 'static,
    W: RunWriter + RunReader + 'static,
    T: Send + 'static,
    F: FnOnce(&MatchingApi<S, W>) -> Result<T, AppError> + Send + 'static,
{
    let api = Arc::clone(api);
    tokio::task::spawn_blocking(move || job(&api))
        .await
        .map_err(std::io::Error::from)?
}

fn latest_run<S, W>(api: &MatchingApi<S, W>, destination: &str) -> Result<StoredRun, AppError>
where
    S: SnapshotSource + 'static,
    W: RunWriter + RunReader + 'static,
{
    let node = &api.config(destination)?.destination.results_node;
    api.service
        .latest(node)?
        .ok_or_else(|| AppError::RunNotFound(node.clone()))
}

pub(crate) async fn run_handler<S, W>(
    State(api): State<Arc<MatchingApi<S, W>>>,
    Path(destination): Path<String>,
) -> Result<Response, AppError>
where
    S: SnapshotSource + 'static,
    W: RunWriter + RunReader + 'static,
{
    let summary = on_blocking_pool(&api, move |api| {
        let config = api.config(&destination)?;
        Ok(api.service.run_now(config)?.summary())
    })
    .await?;
    Ok((StatusCode::ACCEPTED, axum::Json(summary)).into_response())
}

pub(crate) async fn latest_handler<S, W>(
    State(api): State<Arc<MatchingApi<S, W>>>,
    Path(destination): Path<String>,
) -> Result<Response, AppError>
where
    S: SnapshotSource + 'static,
    W: RunWriter + RunReader + 'static,
{
    let run = on_blocking_pool(&api, move |api| latest_run(api, &destination)).await?;
    Ok((StatusCode::OK, axum::Json(run)).into_response())
}

pub(crate) async fn proposals_handler<S, W>(
    State(api): State<Arc<MatchingApi<S, W>>>,
    Path(destination): Path<String>,
) -> Result<Response, AppError>
where
    S: SnapshotSource + 'static,
    W: RunWriter + RunReader + 'static,
{
    let proposals = on_blocking_pool(&api, move |api| {
        latest_run(api, &destination).map(|run| proposals_from_run(&run))
    })
    .await?;
    Ok((StatusCode::OK, axum::Json(proposals)).into_response())
}
