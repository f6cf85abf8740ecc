//! HTTP server and process lifecycle.

use crate::channels::{BotApi, TelegramBot, TelegramUpdate};
use crate::config::{self, Config};
use crate::ingest::IngestController;
use crate::processor::UpdateProcessor;
use crate::retry::RetryPolicy;
use crate::tunnel;
use crate::workflow::AnalysisWorkflow;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Shared state for the HTTP routes.
#[derive(Clone)]
pub struct AppState {
    /// None when no bot token is configured; the webhook then acknowledges
    /// updates without processing them.
    pub processor: Option<Arc<UpdateProcessor>>,
    pub webhook_secret: Option<String>,
}

/// Build the router (health + webhook). Separate from [`run_server`] so tests
/// can serve it on a local listener.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_http))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state)
}

/// Run the HTTP server and the ingestion subsystem; blocks until shutdown
/// (SIGINT/SIGTERM). The analysis workflow is supplied by the host.
pub async fn run_server(config: Config, workflow: Arc<dyn AnalysisWorkflow>) -> Result<()> {
    let bot = config::resolve_telegram_token(&config).map(|token| Arc::new(TelegramBot::new(token)));
    let processor = bot.as_ref().map(|bot| {
        Arc::new(UpdateProcessor::new(
            bot.clone() as Arc<dyn BotApi>,
            workflow,
            RetryPolicy::default(),
            config.images.max_size_bytes(),
        ))
    });

    let controller = match (bot, processor.clone()) {
        (Some(bot), Some(processor)) => {
            // Candidate target: explicit URL wins; otherwise try the tunnel.
            let target = match config::resolve_webhook_url(&config) {
                Some(url) => Some(url),
                None => {
                    tunnel::public_https_url(
                        config.telegram.tunnel.enabled,
                        config.telegram.tunnel.port,
                    )
                    .await
                }
            };
            IngestController::start(
                Some(bot),
                processor,
                target,
                config.telegram.webhook_secret.as_deref(),
            )
            .await
        }
        _ => IngestController::disabled(),
    };

    let state = AppState {
        processor,
        webhook_secret: config.telegram.webhook_secret.clone(),
    };
    let app = router(state);

    let bind_addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(controller))
        .await
        .context("server exited")?;
    log::info!("server stopped");
    Ok(())
}

/// Completes when the process should shut down (SIGINT or SIGTERM), after
/// cancelling ingestion and awaiting the poll loop.
async fn shutdown_signal(mut controller: IngestController) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
    log::info!("shutdown signal received, stopping ingestion and draining connections");
    controller.shutdown().await;
}

/// POST /telegram/webhook — receives a Telegram update JSON body.
///
/// Always answers HTTP 200 for well-formed updates, even when processing
/// fails: a raw 500 would make Telegram disable the webhook. The processing
/// status is carried inside the JSON body instead.
async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    if let Some(ref expected) = state.webhook_secret {
        let provided = headers
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return (
                StatusCode::FORBIDDEN,
                Json(json!({ "ok": false, "error": "bad secret token" })),
            );
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": "malformed update" })),
            );
        }
    };
    let Some(ref processor) = state.processor else {
        return (
            StatusCode::OK,
            Json(json!({ "ok": true, "handled": false })),
        );
    };
    let outcome = processor.process(&update).await;
    if let Some(ref err) = outcome.error {
        log::error!("webhook update {} failed: {}", update.update_id, err);
    }
    (StatusCode::OK, Json(outcome.body))
}

/// GET /health — simple health JSON for probes.
async fn health_http() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "mealsnap",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
