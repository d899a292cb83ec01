use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rup_core::config::{CONFIG_ENV_VAR, DEFAULT_CONFIG_PATH};
use rup_core::processor::RunCompletionCallback;
use rup_core::{
    load_config, validate_config, Collector, ContainerRuntime, DockerRuntime, FileHasher,
    HttpTrackingClient, LogFormat, LoggingConfig, MemoryCollector, OrphanStore, Processor,
    RuleSet, RunReport, SqliteOrphanStore, TrackingDatabase, WorkerContext,
};

use rup_server::api::create_router;
use rup_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // The subscriber may not be installed yet.
        eprintln!("Fatal error: {:#}", e);
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=debug", logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    // Load configuration
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    init_logging(&config.logging);
    info!("Loaded configuration from {:?}", config_path);

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;
    let rules = RuleSet::compile(&config.rules).context("Failed to compile rules")?;
    info!(rules = rules.len(), tracking = %config.tracking.url, "Configuration loaded successfully");

    // Container runtime
    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerRuntime::new(config.container.clone()));
    let checked = Arc::clone(&runtime);
    tokio::spawn(async move {
        // Not fatal: runs retry image pulls and fail per file if the engine stays down.
        match checked.validate().await {
            Ok(()) => info!(runtime = checked.name(), "Container runtime available"),
            Err(e) => warn!(runtime = checked.name(), error = %e, "Container runtime validation failed"),
        }
    });

    // Tracking database
    let tracking: Arc<dyn TrackingDatabase> = Arc::new(
        HttpTrackingClient::new(config.tracking.clone())
            .context("Failed to create tracking database client")?,
    );

    // Orphan store
    let orphans: Option<Arc<dyn OrphanStore>> = if config.orphans.enabled {
        let store: Arc<dyn OrphanStore> = Arc::new(
            SqliteOrphanStore::new(&config.orphans.path)
                .context("Failed to create orphan store")?,
        );
        info!("Orphan store initialized at {:?}", config.orphans.path);
        Some(store)
    } else {
        info!("Orphan store disabled");
        None
    };

    // Processor
    let hasher = FileHasher::new(config.processor.hash_buffer_bytes);
    let mut ctx = WorkerContext::new(config.processor.clone(), runtime, tracking, hasher)
        .context("Failed to create worker context")?;
    if let Some(store) = &orphans {
        ctx = ctx.with_orphan_store(Arc::clone(store));
    }
    let processor = Processor::new(ctx).context("Failed to create processor")?;

    let on_complete: RunCompletionCallback = Arc::new(|report: &RunReport| {
        info!(
            run = report.run,
            rule = %report.rule,
            status = report.status.as_str(),
            publish = report.publish.as_str(),
            records = report.records.len(),
            failures = report.file_failures.len(),
            "Run report"
        );
    });
    processor.on_run_complete(on_complete);
    processor.set_rules(rules);

    // Collector fed by the ingest endpoint
    let collector = Arc::new(MemoryCollector::new());
    let observed: Arc<dyn Collector> = collector.clone();
    processor.attach_collector(&observed);
    info!(
        max_parallel_runs = config.processor.max_parallel_runs,
        max_parallel_files = config.processor.max_parallel_files,
        "Processor started"
    );

    // Create app state
    let addr = SocketAddr::new(config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, processor.clone(), collector, orphans));
    let app = create_router(state);

    // Start server
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let status = processor.status();
    if !status.active_runs.is_empty() {
        warn!(active_runs = ?status.active_runs, "Shutting down with runs in progress");
    }
    info!("Server stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
