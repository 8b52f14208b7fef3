//! Binary entry point.
//!
//! Important env variables:
//!   PORT               : u16 (default 3000)
//!   OPENAI_API_KEY     : enables gateway integration if present
//!   OPENAI_BASE_URL    : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL  : default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL: default "gpt-4o"
//!   MEDIA_API_KEY      : key for the media endpoints (falls back to OPENAI_API_KEY)
//!   AGENT_CONFIG_PATH  : path to TOML config (prompt templates)
//!   DATA_PATH          : persisted-state file (default OS data dir)
//!   LOG_LEVEL          : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT         : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{info, instrument};

use mentora_backend::routes::build_router;
use mentora_backend::state::AppState;
use mentora_backend::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing();

    // Build shared application state (file store, gateway client, prompts).
    let state = Arc::new(AppState::new()?);

    // Build the HTTP router with routes, CORS and tracing layers.
    let app = build_router(state.clone());

    // Read port from env or default to 3000.
    let addr: SocketAddr = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

    let listener = TcpListener::bind(addr).await?;
    info!(target: "mentora_backend", %addr, "HTTP server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
