use crate::cli::ServeArgs;
use crate::infra::{build_desk, seed_agents, AppState};
use crate::routes::with_lending_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use loan_desk::config::AppConfig;
use loan_desk::error::AppError;
use loan_desk::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

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

    let desk = build_desk(config.lending.clone());
    seed_agents(desk.as_ref())?;

    let app = with_lending_routes(desk.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let processor = tokio::spawn(desk.processor().run(shutdown_rx));
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "loan desk ready");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    readiness_flag.store(false, Ordering::Release);
    let _ = shutdown_tx.send(true);
    match processor.await {
        Ok(report) => info!(
            enqueued = report.enqueued,
            processed = report.processed,
            failed = report.failed,
            "processor stopped"
        ),
        Err(err) => warn!(error = %err, "processor task ended abnormally"),
    }

    served?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(err) => {
            warn!(error = %err, "failed to listen for ctrl-c, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
