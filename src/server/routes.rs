//! Filter assembly: routes, rejection handling, CORS and security headers

use crate::chat::ChatRequest;
use crate::error::ErrorBody;
use crate::server::handlers::{self, current_timestamp};
use crate::server::AppState;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, warn};
use warp::http::header::{HeaderMap, HeaderName, HeaderValue};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

/// Request bodies larger than this are rejected with 413
const MAX_BODY_BYTES: u64 = 64 * 1024;

#[derive(Debug)]
struct BodyTooLarge;

impl warp::reject::Reject for BodyTooLarge {}

#[derive(Debug)]
struct InvalidBody(String);

impl warp::reject::Reject for InvalidBody {}

#[derive(Debug)]
struct HostNotAllowed(String);

impl warp::reject::Reject for HostNotAllowed {}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// All API routes without CORS or headers; useful for tests
pub fn api(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let chat_path = warp::path!("chat")
        .or(warp::path!("chat" / "stream"))
        .unify();

    let chat = chat_path
        .and(warp::post())
        .and(chat_body())
        .and(with_state(state.clone()))
        .and_then(handlers::chat);

    let history = warp::path!("chat" / "history" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::history);

    let summary = warp::path!("chat" / "summary" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::summary);

    let health = warp::path!("health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::health);

    let ready = warp::path!("ready")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handlers::ready);

    let index = warp::path::end()
        .and(warp::get())
        .and(with_state(state))
        .and_then(handlers::index);

    chat.or(history)
        .or(summary)
        .or(health)
        .or(ready)
        .or(index)
}

/// JSON chat body, capped at `MAX_BODY_BYTES` whether or not the client
/// sends a Content-Length
fn chat_body() -> impl Filter<Extract = (ChatRequest,), Error = Rejection> + Clone {
    warp::header::optional::<u64>("content-length")
        .and_then(|declared: Option<u64>| async move {
            match declared {
                Some(len) if len > MAX_BODY_BYTES => Err(warp::reject::custom(BodyTooLarge)),
                _ => Ok(()),
            }
        })
        .untuple_one()
        .and(warp::body::stream())
        .and_then(|body| async move {
            let bytes = collect_body(body, MAX_BODY_BYTES).await?;
            serde_json::from_slice::<ChatRequest>(&bytes)
                .map_err(|e| warp::reject::custom(InvalidBody(e.to_string())))
        })
}

/// Read a body stream into memory, giving up once it passes `limit` bytes
async fn collect_body<S, B>(body: S, limit: u64) -> Result<Bytes, Rejection>
where
    S: Stream<Item = Result<B, warp::Error>>,
    B: Buf,
{
    futures::pin_mut!(body);
    let mut collected = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk
            .map_err(|e| warp::reject::custom(InvalidBody(format!("failed to read body: {e}"))))?;
        if (collected.len() + chunk.remaining()) as u64 > limit {
            return Err(warp::reject::custom(BodyTooLarge));
        }
        collected.put(chunk);
    }
    Ok(collected.freeze())
}

/// In production, reject requests whose Host is not in `trusted`
fn host_guard(
    trusted: Option<Vec<String>>,
) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    let trusted = Arc::new(trusted);
    warp::header::optional::<String>("host")
        .and_then(move |host: Option<String>| {
            let trusted = trusted.clone();
            async move {
                let Some(allowed) = trusted.as_deref() else {
                    return Ok(());
                };
                let raw = host.unwrap_or_default();
                let name = host_name(&raw);
                if allowed.iter().any(|pattern| host_matches(pattern, &name)) {
                    Ok(())
                } else {
                    warn!(host = %raw, "Rejected request for untrusted host");
                    Err(warp::reject::custom(HostNotAllowed(raw)))
                }
            }
        })
        .untuple_one()
}

/// Host header without port, lowercased; IPv6 brackets removed
fn host_name(raw: &str) -> String {
    let raw = raw.trim();
    let name = if let Some(rest) = raw.strip_prefix('[') {
        rest.split(']').next().unwrap_or_default()
    } else {
        raw.rsplit_once(':').map_or(raw, |(name, _port)| name)
    };
    name.to_ascii_lowercase()
}

fn host_matches(pattern: &str, host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    match pattern {
        "*" => true,
        _ => match pattern.strip_prefix('*') {
            Some(suffix) => host.ends_with(suffix),
            None => pattern == host,
        },
    }
}

/// Complete service filter: API, error bodies, security headers and CORS
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let headers = security_headers(state.info.production);
    let cors = warp::cors()
        .allow_origins(state.info.allowed_origins.iter().map(String::as_str))
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(vec!["accept", "content-type", "authorization"])
        .allow_credentials(true);

    host_guard(state.info.trusted_hosts.clone())
        .and(api(state))
        .recover(handle_rejection)
        .with(warp::reply::with::headers(headers))
        .with(cors)
        .recover(handle_rejection)
}

/// Headers added to every response
pub fn security_headers(production: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("x-xss-protection"),
        HeaderValue::from_static("1; mode=block"),
    );
    if production {
        headers.insert(
            HeaderName::from_static("strict-transport-security"),
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
    headers
}

/// Turn warp rejections into the same JSON error body handlers use
pub async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    let (status, code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found", "Not found".to_string())
    } else if err.find::<HostNotAllowed>().is_some() {
        (
            StatusCode::BAD_REQUEST,
            "invalid_host",
            "Invalid host header".to_string(),
        )
    } else if let Some(InvalidBody(reason)) = err.find::<InvalidBody>() {
        (
            StatusCode::BAD_REQUEST,
            "invalid_input",
            format!("Invalid request body: {reason}"),
        )
    } else if let Some(e) = err.find::<warp::reject::InvalidHeader>() {
        (
            StatusCode::BAD_REQUEST,
            "invalid_header",
            format!("Invalid header: {}", e.name()),
        )
    } else if err.find::<BodyTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            "Request body too large".to_string(),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "Method not allowed".to_string(),
        )
    } else if err.find::<warp::filters::cors::CorsForbidden>().is_some() {
        (
            StatusCode::FORBIDDEN,
            "cors_forbidden",
            "Origin not allowed".to_string(),
        )
    } else {
        error!(rejection = ?err, "Unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal server error".to_string(),
        )
    };

    debug!(status = status.as_u16(), code, "Request rejected");
    let body = ErrorBody {
        error: message,
        code,
        timestamp: current_timestamp(),
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}
