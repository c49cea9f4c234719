//! Backendify - one API in front of per-country company registry backends

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use backendify_api::{AppState, create_router};
use backendify_core::{
    AdmissionGate, BackendRegistry, CompanyCache, EngineConfig, FetchEngine, parse_backend_arg,
};
use backendify_proxy::{BackendClient, BackendClientConfig, CompanySource, MockBackend};
use config::Config;

/// Backendify - company registry gateway
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", env = "BACKENDIFY_CONFIG")]
    config: String,

    /// Bind address
    #[arg(long, env = "BACKENDIFY_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "BACKENDIFY_PORT")]
    port: Option<u16>,

    /// Backends as <country>=<origin>, e.g. us=http://localhost:9001
    backends: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(&args.config)?;

    // Command line backends take precedence over the file
    let mut skipped = Vec::new();
    for arg in &args.backends {
        match parse_backend_arg(arg) {
            Ok((country, origin)) => {
                config.backends.insert(country, origin);
            }
            Err(e) => skipped.push(e),
        }
    }
    config.validate()?;

    // Initialize logging
    init_logging(&config.logging.level, &config.logging.format);

    info!("Starting Backendify v{}", env!("CARGO_PKG_VERSION"));
    match &config.source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("Config file not found at {}, using defaults", args.config),
    }
    for e in skipped {
        warn!("Ignoring backend argument: {}", e);
    }

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let backends = Arc::new(
        BackendRegistry::new(config.backends.clone()).context("Invalid backend configuration")?,
    );
    if backends.is_empty() {
        warn!("No backends configured, every company lookup will return 404");
    }
    for country in backends.countries() {
        info!("Backend {}: {}", country, backends.resolve(country).unwrap_or_default());
    }

    // Initialize upstream source
    let source: Arc<dyn CompanySource> = if config.engine.mock_backends {
        warn!("Mock backends enabled, no real registry will be called");
        Arc::new(MockBackend::new())
    } else {
        Arc::new(BackendClient::new(BackendClientConfig {
            request_timeout: config.backend_timeout(),
            ..Default::default()
        })?)
    };

    // Initialize cache and worker pool
    let cache_capacity =
        NonZeroUsize::new(config.engine.cache_size).context("engine.cache_size must be positive")?;
    let workers =
        NonZeroUsize::new(config.engine.workers).context("engine.workers must be positive")?;
    let cache = Arc::new(CompanyCache::new(cache_capacity));
    let engine = Arc::new(FetchEngine::start(
        EngineConfig {
            workers,
            job_timeout: config.job_timeout(),
            cache_key_mode: config.engine.cache_key,
        },
        cache,
        source,
    ));

    let gate = Arc::new(AdmissionGate::new(
        config.admission.capacity,
        config.admission_wait(),
    ));

    // Create application state
    let state = AppState::new(backends, engine.clone(), gate);

    // Create router
    let app = create_router(state, Some(Arc::new(metrics_handle)))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http());

    // Determine bind address
    let bind_addr = args.bind.unwrap_or(config.server.bind_address);
    let port = args.port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", bind_addr, port).parse()?;

    info!("Listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, draining workers");
    engine.shutdown().await;

    info!("Backendify stopped");
    Ok(())
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Wait for the first shutdown signal; a second Ctrl+C forces an exit
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, press Ctrl+C again to force exit");

    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt received, forcing exit");
            std::process::exit(1);
        }
    });
}
