use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use actlog_server::{AppState, ServerConfig, app};

#[derive(Parser, Debug)]
#[command(name = "actlog-server", version, about = "actlog demo server")]
struct Cli {
    /// YAML configuration file
    #[arg(long, env = "ACTLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address, overrides the configuration file
    #[arg(long, env = "ACTLOG_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = ServerConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        cfg.bind = bind;
    }

    let state = Arc::new(AppState::init(&cfg).await?);
    let app = app(state).layer(TraceLayer::new_for_http());

    tracing::info!("actlog-server listening on {}", cfg.bind);

    let listener = tokio::net::TcpListener::bind(&cfg.bind).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
