use crate::cli::ServeArgs;
use crate::infra::{AppState, LocalAvatarStore, LoggingNotifier};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use fame_catalog::config::AppConfig;
use fame_catalog::error::AppError;
use fame_catalog::telemetry;
use fame_catalog::workflows::catalog::{
    CatalogStore, Dispatcher, MemorySessionStore, MemoryStore, SqliteStore,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(database_url) = args.database_url.take() {
        config.storage.database_url = database_url;
    }

    telemetry::init(&config.telemetry)?;

    if args.memory {
        info!("using in-memory catalog store");
        serve(config, Arc::new(MemoryStore::new())).await
    } else {
        let store = SqliteStore::connect(&config.storage.database_url).await?;
        info!(database_url = %config.storage.database_url, "catalog database ready");
        serve(config, Arc::new(store)).await
    }
}

async fn serve<R>(config: AppConfig, store: Arc<R>) -> Result<(), AppError>
where
    R: CatalogStore + 'static,
{
    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    if config.moderation.admin_ids.is_empty() {
        warn!("ADMIN_IDS is empty; nobody can moderate applications");
    }

    let dispatcher = Arc::new(Dispatcher::new(
        store,
        Arc::new(LoggingNotifier),
        Arc::new(MemorySessionStore::default()),
        Arc::new(LocalAvatarStore::new(config.storage.avatar_dir.clone())),
        &config.moderation,
    ));

    let app = with_service_routes(dispatcher)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        admins = config.moderation.admin_ids.len(),
        "fame catalog bot ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
