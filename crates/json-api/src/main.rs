//! Veritag Scan API Server

use std::{process, time::Duration};

use salvo::{
    affix_state::inject,
    catch_panic::CatchPanic,
    oapi::OpenApi,
    prelude::*,
    timeout::Timeout,
    trailing_slash::remove_slash,
};
use tracing::{error, info};

use veritag_app::context::AppContext;

use crate::{
    config::{ServerCommand, ServerConfig},
    middleware::HttpRateLimiter,
    observability::Observability,
    state::State,
};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod config;
mod extensions;
mod healthcheck;
mod middleware;
mod observability;
mod router;
mod scans;
mod shutdown;
mod state;
mod verify;

#[cfg(test)]
mod test_helpers;

/// HTTP-layer per-IP admissions per minute, ahead of the distributed
/// limiter.
const HTTP_LIMIT_PER_MINUTE: u32 = 100;

/// Veritag Scan API Server entry point
///
/// # Panics
///
/// Panics if the server fails to bind or serve requests
#[tokio::main]
pub async fn main() {
    // Load configuration from .env and CLI arguments
    let config = ServerConfig::load().unwrap_or_else(|e| {
        #[expect(
            clippy::print_stderr,
            reason = "logging not initialized yet, must use eprintln for config errors"
        )]
        {
            eprintln!("Configuration error: {e}");
        }

        process::exit(1);
    });

    if let Some(ServerCommand::Healthcheck) = config.command {
        process::exit(run_healthcheck(config.server.port).await);
    }

    // Initialize logging and telemetry
    let observability = Observability::init(&config).unwrap_or_else(|e| {
        #[expect(
            clippy::print_stderr,
            reason = "logging not initialized yet, must use eprintln for init errors"
        )]
        {
            eprintln!("Observability error: {e}");
        }

        process::exit(1);
    });

    let addr = config.socket_addr();
    info!(
        read_timeout = config.server.read_timeout,
        write_timeout = config.server.write_timeout,
        "Starting server on {addr}"
    );

    // Bind server
    let listener = TcpListener::new(addr).bind().await;

    let app = match AppContext::from_settings(config.app_settings()).await {
        Ok(app) => app,
        Err(init_error) => {
            error!("failed to initialize application context: {init_error}");
            process::exit(1);
        }
    };

    let state = State::from_app_context(app);
    let http_limiter = HttpRateLimiter::new(HTTP_LIMIT_PER_MINUTE, Duration::from_secs(60));

    let router = Router::new()
        .hoop(CatchPanic::new())
        .hoop(remove_slash())
        .hoop(observability::request_logging)
        .hoop(Timeout::new(config.server.context_timeout()))
        .hoop(http_limiter.clone())
        .hoop(inject(state))
        .push(router::app_router());

    let doc = OpenApi::new("Veritag Scan API", env!("CARGO_PKG_VERSION")).merge_router(&router);

    let router = router.push(doc.into_router("/api-doc/openapi.json"));

    let server = Server::new(listener);

    let handle = server.handle();
    let shutdown_timeout = config.server.shutdown_timeout();

    // Listen for shutdown signal
    tokio::spawn(async move {
        if let Err(error) = shutdown::listen(handle, shutdown_timeout).await {
            error!("failed to listen for shutdown signal: {error}");
        }
    });

    // Start serving requests
    server.serve(router).await;

    http_limiter.stop();
    observability.shutdown();

    info!("server stopped");
}

/// Probe the local health endpoint; exit code 0 means HTTP 200.
async fn run_healthcheck(port: u16) -> i32 {
    let url = format!("http://127.0.0.1:{port}/v1/health");

    let Ok(client) = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
    else {
        return 1;
    };

    match client.get(url).send().await {
        Ok(response) if response.status() == reqwest::StatusCode::OK => 0,
        _ => 1,
    }
}
