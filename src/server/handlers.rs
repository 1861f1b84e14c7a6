//! Request handlers for the chat API

use crate::chat::ChatRequest;
use crate::error::RouterError;
use crate::health::{HealthCheckManager, HealthCheckResult};
use crate::server::AppState;
use crate::session::Turn;
use futures::StreamExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::convert::Infallible;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::reply::{Reply, Response};

#[derive(Debug, Serialize)]
struct HistoryResponse {
    session_id: String,
    turns: Vec<Turn>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    service: &'static str,
    version: &'static str,
    triage_strategy: String,
    sessions: usize,
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    ready: bool,
    timestamp: String,
    checks: Vec<HealthCheckResult>,
}

#[derive(Debug, Serialize)]
struct ApiDocumentationResponse {
    service: &'static str,
    version: &'static str,
    endpoints: BTreeMap<&'static str, &'static str>,
}

pub(crate) fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// JSON error reply with the status mapped from the error
pub(crate) fn error_reply(error: &RouterError) -> Response {
    warp::reply::with_status(warp::reply::json(&error.to_error_body()), error.status_code())
        .into_response()
}

/// `POST /chat`: stream the answer as server-sent events
pub async fn chat(request: ChatRequest, state: AppState) -> Result<Response, Infallible> {
    match state.router.start_turn(request).await {
        Ok(turn) => {
            info!(session_id = %turn.session_id, agent = %turn.agent, "Streaming chat turn");
            let events = turn
                .into_stream()
                .map(|event| warp::sse::Event::default().json_data(event));
            Ok(warp::sse::reply(warp::sse::keep_alive().stream(events)).into_response())
        }
        Err(e) => {
            warn!(error = %e, status = e.status_code().as_u16(), "Chat turn rejected");
            Ok(error_reply(&e))
        }
    }
}

/// `GET /chat/history/{session_id}`
pub async fn history(session_id: String, state: AppState) -> Result<Response, Infallible> {
    let turns = state.router.store().read(&session_id).await;
    Ok(warp::reply::json(&HistoryResponse { session_id, turns }).into_response())
}

/// `GET /chat/summary/{session_id}`
pub async fn summary(session_id: String, state: AppState) -> Result<Response, Infallible> {
    match state.router.store().summary(&session_id).await {
        Some(summary) => Ok(warp::reply::json(&summary).into_response()),
        None => Ok(error_reply(&RouterError::SessionNotFound { session_id })),
    }
}

/// `GET /health`: liveness plus basic service facts
pub async fn health(state: AppState) -> Result<Response, Infallible> {
    let response = HealthResponse {
        status: "healthy",
        timestamp: current_timestamp(),
        service: state.info.service,
        version: state.info.version,
        triage_strategy: state.info.triage_strategy.clone(),
        sessions: state.router.store().session_count().await,
    };
    Ok(warp::reply::json(&response).into_response())
}

/// `GET /ready`: runs component checks
pub async fn ready(state: AppState) -> Result<Response, Infallible> {
    let checks = state.health.run_health_checks().await;
    let ready = HealthCheckManager::overall_health(&checks);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = ReadinessResponse {
        ready,
        timestamp: current_timestamp(),
        checks,
    };
    Ok(warp::reply::with_status(warp::reply::json(&response), status).into_response())
}

/// `GET /`: endpoint listing
pub async fn index(state: AppState) -> Result<Response, Infallible> {
    let mut endpoints = BTreeMap::new();
    endpoints.insert("POST /chat", "Send a message; answer streams as server-sent events");
    endpoints.insert("POST /chat/stream", "Alias of POST /chat");
    endpoints.insert("GET /chat/history/{session_id}", "Turns stored for a session");
    endpoints.insert("GET /chat/summary/{session_id}", "Turn and agent statistics for a session");
    endpoints.insert("GET /health", "Liveness and service information");
    endpoints.insert("GET /ready", "Readiness with component checks");

    let response = ApiDocumentationResponse {
        service: state.info.service,
        version: state.info.version,
        endpoints,
    };
    Ok(warp::reply::json(&response).into_response())
}
