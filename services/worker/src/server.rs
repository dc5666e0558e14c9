use crate::cli::WorkArgs;
use crate::infra::{
    AppState, ConfiguredNotifier, Fixtures, InMemoryRuleSetRepository,
    InMemorySubmissionRepository,
};
use crate::routes::probe_routes;
use codegate::config::AppConfig;
use codegate::error::AppError;
use codegate::telemetry::{self, TelemetryError};
use codegate::workflows::submissions::{
    ArchiveLoader, JobHandler, QueueBackend, SubmissionProcessor, SubmissionQueue,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

pub(crate) async fn run(mut args: WorkArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| TelemetryError::Subscriber(Box::new(err)))?;
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(metrics_handle),
    };

    let fixtures = match args.fixtures.as_deref() {
        Some(path) => Fixtures::load(path)?,
        None => Fixtures::default(),
    };
    let pending = fixtures.pending_ids();

    let processor = SubmissionProcessor::new(
        Arc::new(InMemorySubmissionRepository::seeded(fixtures.submissions)),
        Arc::new(InMemoryRuleSetRepository::seeded(fixtures.rule_sets)),
        Arc::new(ConfiguredNotifier::from_config(&config)?),
        Arc::new(ArchiveLoader::new(&config.archive)?),
    );
    let handler: Arc<dyn JobHandler> = Arc::new(processor);

    let queue = QueueBackend::from_config(&config.queue).await?;
    if args.enqueue_pending {
        for id in pending {
            queue.enqueue(id).await?;
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let mut server_shutdown = shutdown_rx.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, probe_routes(app_state))
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(err) => error!(error = %err, "failed to listen for shutdown signal"),
        }
        let _ = signal_tx.send(true);
    });

    readiness_flag.store(true, Ordering::Release);
    info!(
        ?config.environment,
        %addr,
        backend = queue.kind().label(),
        worker_id = %config.queue.worker_id,
        "submission worker ready"
    );

    let consumed = queue.consume(handler, shutdown_rx).await;
    readiness_flag.store(false, Ordering::Release);
    // The consumer may also stop on its own; release the probe server either way.
    let _ = shutdown_tx.send(true);

    match server.await {
        Ok(result) => result?,
        Err(err) => error!(error = %err, "probe server task failed"),
    }
    consumed?;

    info!("submission worker stopped");
    Ok(())
}
