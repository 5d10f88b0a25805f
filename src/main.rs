use anyhow::{anyhow, Context, Result};
use clap::Parser;
use funasr_bridge::{create_router, AppState, Config, SessionRegistry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "funasr-bridge", about = "Relay browser audio to a FunASR backend and stream transcriptions back")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/funasr-bridge")]
    config: String,

    /// Override the HTTP bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Needed before the first wss:// backend connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let args = Args::parse();
    let mut cfg = Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        cfg.service.http.bind = bind;
    }
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!(
        "Recognition backend: {}://{}:{} (mode={})",
        if cfg.backend.use_ssl { "wss" } else { "ws" },
        cfg.backend.host,
        cfg.backend.port,
        cfg.backend.mode
    );

    let state = AppState::new(cfg.backend.clone()).with_allowed_origins(cfg.cors.allowed_origins.clone());
    let registry = Arc::clone(&state.registry);
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry))
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(registry: Arc<SessionRegistry>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }

    info!("Shutdown requested");
    registry.shutdown().await;
}
