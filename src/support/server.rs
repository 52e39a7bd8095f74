use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::agent::SupportAgent;
use super::api::{self, AppState, ProcessingDelay};
use super::db::{DbHandle, SupportDb};
use super::llm::{AnthropicClient, LlmClient, OpenAiClient};
use super::ws;
use crate::config::SupportConfig;

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub cors: bool,
    pub processing_delay: ProcessingDelay,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            db_path: PathBuf::from("data/crm_ecommerce.db"),
            cors: false,
            processing_delay: ProcessingDelay::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_config(config: &SupportConfig) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: config.database.path.clone(),
            cors: config.server.cors,
            processing_delay: ProcessingDelay::new(
                config.server.processing_delay_min_secs,
                config.server.processing_delay_max_secs,
            ),
        }
    }
}

/// Build the support agent, wiring whichever model clients have keys.
/// A client that fails to build is logged and left out.
pub fn build_agent(db: DbHandle, config: &SupportConfig) -> SupportAgent {
    let claude: Option<Arc<dyn LlmClient>> = match config.anthropic.api_key.as_deref() {
        Some(key) => match AnthropicClient::new(
            key,
            &config.anthropic.model,
            &config.anthropic.base_url,
            config.anthropic.timeout(),
        ) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "Claude client unavailable, using keyword fallback");
                None
            }
        },
        None => None,
    };

    let openai: Option<Arc<dyn LlmClient>> = match config.openai.api_key.as_deref() {
        Some(key) => match OpenAiClient::new(
            key,
            &config.openai.model,
            &config.openai.base_url,
            config.openai.timeout(),
        ) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "OpenAI client unavailable");
                None
            }
        },
        None => None,
    };

    SupportAgent::new(db, claude, openai)
}

/// Build the full application router with API and WebSocket.
pub fn build_router(state: Arc<AppState>, cors: bool) -> Router {
    let ws_tx = state.ws_tx.clone();

    let app = api::api_router()
        .route(
            "/ws",
            get(move |ws_upgrade| ws::ws_handler_with_sender(ws_upgrade, ws_tx)),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Start the support server.
pub async fn start_server(config: ServerConfig, settings: &SupportConfig) -> Result<()> {
    let db = SupportDb::new(&config.db_path).context("Failed to initialize support database")?;
    let db = DbHandle::new(db);
    let agent = Arc::new(build_agent(db.clone(), settings));
    let (ws_tx, _rx) = broadcast::channel::<String>(256);

    let mode = if agent.claude_ready() {
        "claude-ai"
    } else {
        "fallback"
    };
    let state = Arc::new(AppState {
        db,
        agent,
        ws_tx,
        processing_delay: config.processing_delay,
        started_at: Instant::now(),
    });

    let app = build_router(state, config.cors);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(
        addr = %local_addr,
        db = %config.db_path.display(),
        mode,
        delay_min = config.processing_delay.min_secs,
        delay_max = config.processing_delay.max_secs,
        "Support desk listening"
    );
    println!("Support desk running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
