use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chainsign_core::{DeviceRegistry, DeviceStore, InMemoryStore, SigningEngine};

mod routes;

/// chainsign-server - issues chained signatures for registered signing devices
#[derive(Parser, Debug, Clone)]
#[command(name = "chainsign-server")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("chainsign_server={lvl},chainsign_core={lvl},info", lvl = args.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store: Arc<dyn DeviceStore> = Arc::new(InMemoryStore::new());
    let engine = Arc::new(SigningEngine::new(DeviceRegistry::new(store.clone()), store));
    let app = routes::router(engine);

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("binding {}", args.listen))?;
    info!(addr = %args.listen, version = chainsign_core::version(), "chainsign-server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
