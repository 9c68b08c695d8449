//! Warden Server — entry point.
//!
//! Reads configuration from environment variables, boots the orchestrator
//! and its background loops, serves the HTTP/SSE API, and drains in-flight
//! work on shutdown.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `PORT` | `3333` | TCP port to listen on. |
//! | `HOST` | `0.0.0.0` | Bind address. |
//! | `VAULT_PATH` | `.` | Root of the knowledge base this server orchestrates. |
//! | `API_KEY` | *(none)* | When set, required via `X-API-Key` on every `/api/*` request. |

use tracing_subscriber::EnvFilter;
use warden_core::config::Config;
use warden_core::lifecycle;
use warden_server::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warden=info".parse().unwrap()))
        .init();

    let config = Config::from_env();
    let addr = format!("{}:{}", config.host, config.port);

    let ctx = lifecycle::boot(config.clone()).await;
    let state = AppState::new(ctx.orchestrator.clone(), config);
    let app = warden_server::build_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %addr, "warden-server listening");

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = serve.await {
        tracing::error!("server error: {e}");
    }

    lifecycle::shutdown(ctx).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
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
