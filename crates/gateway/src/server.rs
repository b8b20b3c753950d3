use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    archiver_config::ArchiverConfig,
    archiver_sandbox::{BlockingPool, DockerCli, SandboxClient, SandboxRuntime},
    axum::{
        Router,
        extract::State,
        response::{IntoResponse, Json},
        routing::get,
    },
    tower_http::trace::TraceLayer,
    tracing::{info, warn},
};

use crate::{
    admission::AdmissionGate, archive_routes::archive_handler, job::JobBuilder,
    jobs::ArchiveJobs, state::GatewayState,
};

// ── Shared app state ─────────────────────────────────────────────────────────

pub type AppState = Arc<GatewayState>;

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: AppState) -> Router {
    let archive = Router::new()
        .route("/archive", get(archive_handler))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            crate::auth_middleware::require_access_key,
        ));

    let router = Router::new()
        .route("/health", get(health_handler))
        .merge(archive);

    #[cfg(feature = "prometheus")]
    let router = router.route(
        "/metrics",
        get(crate::metrics_routes::prometheus_metrics_handler),
    );

    #[cfg(feature = "metrics")]
    let router = router.layer(axum::middleware::from_fn(
        crate::metrics_middleware::http_metrics_middleware,
    ));

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Wire the archive pipeline from config.
pub fn build_jobs(config: &ArchiverConfig, runtime: Arc<dyn SandboxRuntime>) -> ArchiveJobs {
    let archive = &config.archive;
    let pool = BlockingPool::new(archive.blocking_pool_size());
    ArchiveJobs::new(
        AdmissionGate::new(archive.concurrent_workers),
        SandboxClient::new(runtime, pool),
        JobBuilder::new(
            &archive.volume_path,
            &archive.worker_image,
            &archive.archive_extension,
        ),
        Duration::from_secs(archive.timeout_secs),
    )
}

/// Start the HTTP server and serve until Ctrl-C or SIGTERM.
pub async fn start_gateway(config: ArchiverConfig) -> anyhow::Result<()> {
    let archive = &config.archive;
    let docker = Arc::new(DockerCli::new(&archive.docker_cli, archive.docker_host.clone()));
    let probe = Arc::clone(&docker);
    // The daemon may come up after us; every job reports its own failure.
    match tokio::task::spawn_blocking(move || probe.ping()).await {
        Ok(Ok(())) => {},
        Ok(Err(e)) => warn!(error = %e, "container daemon not reachable at startup"),
        Err(e) => warn!(error = %e, "container daemon probe panicked"),
    }

    #[cfg(feature = "metrics")]
    let metrics_handle = archiver_metrics::init_metrics(archiver_metrics::MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: Vec::new(),
    })?;

    let jobs = build_jobs(&config, docker);
    let state = GatewayState::new(
        jobs.clone(),
        archive.access_key().cloned(),
        archive.max_disk_quota,
        #[cfg(feature = "metrics")]
        metrics_handle,
    );
    let app = build_gateway_app(state);

    let listener =
        tokio::net::TcpListener::bind((config.server.bind.as_str(), config.server.port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    info!(
        %addr,
        version = env!("CARGO_PKG_VERSION"),
        backend = jobs.client().backend_name(),
        workers = jobs.gate().capacity(),
        blocking = jobs.client().pool().size(),
        image = %archive.worker_image,
        volume = %archive.volume_path.display(),
        auth = archive.access_key().is_some(),
        "git-archiver listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    jobs.shutdown().await;
    info!("git-archiver stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received, draining in-flight requests");
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let gate = state.jobs.gate();
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
        "capacity": gate.capacity(),
        "available": gate.available(),
    }))
}
