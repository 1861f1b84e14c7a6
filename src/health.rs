//! Component health checks behind `GET /ready`
//!
//! Each check reports one dependency: the hosted model provider and the
//! session store. The manager aggregates them; all must pass for readiness.

use crate::llm::provider::LlmProvider;
use crate::session::SessionStore;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Health check result
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub component: String,
    pub healthy: bool,
    pub message: Option<String>,
    pub response_time_ms: Option<u64>,
}

/// Trait for components that can be health checked
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Perform health check on this component
    async fn health_check(&self) -> HealthCheckResult;

    /// Get the component name for reporting
    fn component_name(&self) -> &str;
}

/// Hosted model reachability
pub struct LlmProviderHealthCheck {
    llm_provider: Arc<dyn LlmProvider>,
    timeout: Duration,
}

impl LlmProviderHealthCheck {
    pub fn new(llm_provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm_provider,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl HealthCheck for LlmProviderHealthCheck {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let component = self.component_name().to_string();
        let provider = self.llm_provider.name();

        let outcome = tokio::time::timeout(self.timeout, self.llm_provider.health_check()).await;
        let response_time_ms = start.elapsed().as_millis() as u64;

        let (healthy, message) = match outcome {
            Ok(Ok(())) => {
                debug!(provider, response_time_ms, "LLM provider healthy");
                (true, format!("{provider} provider healthy"))
            }
            Ok(Err(e)) => {
                let hint = if e.is_connectivity() {
                    " (network restriction or private endpoint?)"
                } else {
                    ""
                };
                warn!(provider, error = %e, response_time_ms, "LLM provider health check failed");
                (false, format!("{provider} provider error: {e}{hint}"))
            }
            Err(_) => {
                warn!(provider, response_time_ms, "LLM provider health check timed out");
                (
                    false,
                    format!("{provider} provider did not answer within {:?}", self.timeout),
                )
            }
        };

        HealthCheckResult {
            component,
            healthy,
            message: Some(message),
            response_time_ms: Some(response_time_ms),
        }
    }

    fn component_name(&self) -> &str {
        "llm_provider"
    }
}

/// Session store responsiveness
pub struct SessionStoreHealthCheck {
    store: Arc<dyn SessionStore>,
}

impl SessionStoreHealthCheck {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthCheck for SessionStoreHealthCheck {
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let sessions = self.store.session_count().await;

        HealthCheckResult {
            component: self.component_name().to_string(),
            healthy: true,
            message: Some(format!("{sessions} active sessions")),
            response_time_ms: Some(start.elapsed().as_millis() as u64),
        }
    }

    fn component_name(&self) -> &str {
        "session_store"
    }
}

/// Aggregated health check manager
#[derive(Default)]
pub struct HealthCheckManager {
    health_checks: Vec<Box<dyn HealthCheck>>,
}

impl HealthCheckManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a health check to the manager
    pub fn add_health_check(&mut self, health_check: Box<dyn HealthCheck>) {
        self.health_checks.push(health_check);
    }

    pub fn with_health_check(mut self, health_check: Box<dyn HealthCheck>) -> Self {
        self.add_health_check(health_check);
        self
    }

    /// Run all health checks concurrently, in registration order
    pub async fn run_health_checks(&self) -> Vec<HealthCheckResult> {
        futures::future::join_all(self.health_checks.iter().map(|c| c.health_check())).await
    }

    /// Overall health: every component must be healthy
    pub fn overall_health(results: &[HealthCheckResult]) -> bool {
        if results.is_empty() {
            warn!("No health checks configured - assuming healthy");
            return true;
        }
        let healthy_count = results.iter().filter(|r| r.healthy).count();
        debug!(
            healthy_count,
            total = results.len(),
            "Aggregated component health"
        );
        healthy_count == results.len()
    }
}
