//! search-gateway binary
//!
//! Loads settings, wires the DuckDuckGo provider into the gateway and
//! serves the HTTP API.

use anyhow::{bail, Result};
use search_gateway::{
    config,
    upstream::DuckDuckGo,
    web::{create_router, AppState},
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

enum Command {
    Serve { config: Option<PathBuf> },
    Help,
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = match parse_args(std::env::args().skip(1))? {
        Command::Help => {
            print_usage();
            return Ok(());
        }
        Command::Version => {
            println!("search-gateway {}", search_gateway::VERSION);
            return Ok(());
        }
        Command::Serve { config } => config,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Starting search-gateway v{}", search_gateway::VERSION);

    let settings = config::load(config_path.as_deref())?;
    info!(
        safesearch = %settings.search.safe_search,
        timeout = settings.outgoing.request_timeout,
        "Configuration loaded; bearer authentication enabled"
    );

    let provider = Arc::new(DuckDuckGo::new(settings.outgoing.clone()));
    let addr = SocketAddr::new(settings.server.bind_address.parse()?, settings.server.port);

    let state = AppState::new(settings, provider);
    info!("Upstream provider: {}", state.gateway.provider_name());

    let app = create_router(state);

    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<Command> {
    let mut config = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-V" | "--version" => return Ok(Command::Version),
            "-c" | "--config" => match args.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => bail!("{arg} requires a file path"),
            },
            other => bail!("unknown argument: {other} (see --help)"),
        }
    }
    Ok(Command::Serve { config })
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until killed.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Print usage information
fn print_usage() {
    println!(
        r#"
search-gateway v{}
An authenticated JSON gateway for DuckDuckGo search

USAGE:
    search-gateway [OPTIONS]

OPTIONS:
    -c, --config <FILE>    Path to configuration file
    -h, --help             Print help information
    -V, --version          Print version information

ENVIRONMENT VARIABLES:
    SECRET_KEY                   Bearer credential (required)
    SAFESEARCH                   strict | moderate | off (default: moderate)
    SEARCH_GATEWAY_SETTINGS      Path to settings.yml
    SEARCH_GATEWAY_PORT, PORT    Server port (default: 8000)
    SEARCH_GATEWAY_BIND_ADDRESS  Bind address (default: 127.0.0.1)
    SEARCH_GATEWAY_TIMEOUT       Upstream timeout in seconds (default: 10)
    RUST_LOG                     Log filter (default: info)
"#,
        search_gateway::VERSION
    );
}
