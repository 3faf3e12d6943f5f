use crate::cli::ServeArgs;
use crate::infra::{file_service, run_configs, AppState};
use crate::routes::with_matching_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use lab_match::config::AppConfig;
use lab_match::error::AppError;
use lab_match::telemetry;
use lab_match::workflows::matching::{DestinationKind, MatchingApi};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let configs = run_configs(&config.matching, &DestinationKind::ALL)?;
    let service = file_service(&config.matching, None);
    let api = Arc::new(MatchingApi::new(service, configs));

    let app = with_matching_routes(api)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        store = %config.matching.store_path.display(),
        "lab matching service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
