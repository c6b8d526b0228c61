use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use mimalloc::MiMalloc;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use kiro_proxy::config::Config;
use kiro_proxy::flow::{SharedFlowSink, TracingFlowSink};
use kiro_proxy::orchestrator::Orchestrator;
use kiro_proxy::persistence::Persistence;
use kiro_proxy::pool;
use kiro_proxy::refresher;
use kiro_proxy::server::{self, AppState};
use kiro_proxy::upstream::UpstreamClient;
use kiro_proxy::background::BackgroundScheduler;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Local reverse proxy speaking the OpenAI, Anthropic and Gemini chat protocols to a Kiro upstream.
#[derive(Parser)]
struct Cli {
    /// Overrides `basic.listen_port` from config.toml / the environment.
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let cfg = Config::load();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    let persistence = Arc::new(Persistence::new(cfg.account_store_path()));
    let initial_accounts = persistence.load()?;

    let refresher_handle = refresher::spawn(reqwest::Client::new(), cfg.basic.upstream_base_url.clone()).await;
    let pool_handle = pool::spawn(initial_accounts, persistence, refresher_handle.clone()).await;
    let upstream_client = Arc::new(UpstreamClient::new(cfg.basic.upstream_base_url.clone()));

    let scheduler =
        BackgroundScheduler::spawn(pool_handle.clone(), refresher_handle.clone(), upstream_client.clone());

    let flow_sink: SharedFlowSink = Arc::new(TracingFlowSink);
    let orchestrator = Orchestrator::new(pool_handle.clone(), refresher_handle, upstream_client, flow_sink);
    let state = AppState::new(orchestrator, pool_handle);
    let app = server::build_router(state);

    let port = cfg.resolve_port(cli.port);
    let addr = SocketAddr::from((cfg.basic.listen_addr, port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server has shut down, draining background tasks");
    scheduler.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
