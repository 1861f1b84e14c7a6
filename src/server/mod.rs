//! HTTP server exposing the chat API
//!
//! Built on warp. Chat answers stream as server-sent events; everything else
//! is JSON.

pub mod handlers;
pub mod routes;

use crate::chat::ChatRouter;
use crate::config::RouterConfig;
use crate::health::HealthCheckManager;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};

pub use routes::{api, handle_rejection, routes, security_headers};

/// Static facts about the running service
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub triage_strategy: String,
    pub production: bool,
    pub allowed_origins: Vec<String>,
    /// Host names accepted in the Host header; `None` disables the check
    pub trusted_hosts: Option<Vec<String>>,
}

impl ServiceInfo {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            service: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            triage_strategy: config.triage.strategy.as_str().to_string(),
            production: config.server.is_production(),
            allowed_origins: normalize_origins(&config.server.allowed_origins()),
            trusted_hosts: config
                .server
                .is_production()
                .then(|| config.server.trusted_hosts()),
        }
    }
}

/// Reduce configured origins to `scheme://host[:port]`, dropping anything
/// that is not an http(s) origin
pub fn normalize_origins(origins: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(origins.len());
    for raw in origins {
        match url::Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                let origin = url.origin().ascii_serialization();
                if !normalized.contains(&origin) {
                    normalized.push(origin);
                }
            }
            _ => warn!(origin = %raw, "Ignoring invalid CORS origin"),
        }
    }
    normalized
}

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ChatRouter>,
    pub health: Arc<HealthCheckManager>,
    pub info: Arc<ServiceInfo>,
}

impl AppState {
    pub fn new(router: Arc<ChatRouter>, health: HealthCheckManager, info: ServiceInfo) -> Self {
        Self {
            router,
            health: Arc::new(health),
            info: Arc::new(info),
        }
    }
}

/// Chat HTTP server
pub struct ChatServer {
    state: AppState,
    addr: SocketAddr,
}

impl ChatServer {
    pub fn new(state: AppState, host: &str, port: u16) -> Result<Self, crate::config::ConfigError> {
        let ip: IpAddr = host.parse().map_err(|_| {
            crate::config::ConfigError::InvalidConfig(format!(
                "server.host must be an IP address, got '{host}'"
            ))
        })?;
        Ok(Self {
            state,
            addr: SocketAddr::new(ip, port),
        })
    }

    /// Serve until `shutdown` resolves
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter = routes(self.state);
        let (addr, server) =
            warp::serve(filter).try_bind_with_graceful_shutdown(self.addr, shutdown)?;

        info!(%addr, "Chat server listening");
        server.await;
        info!("Chat server stopped");
        Ok(())
    }
}
