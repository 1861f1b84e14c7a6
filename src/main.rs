//! Triage Router - Main Entry Point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use triage_router::chat::ChatRouter;
use triage_router::config::{ConfigSource, RouterConfig};
use triage_router::health::{HealthCheckManager, LlmProviderHealthCheck, SessionStoreHealthCheck};
use triage_router::llm::provider::LlmProvider;
use triage_router::llm::providers::{OpenAiConfig, OpenAiProvider};
use triage_router::observability::init_default_logging;
use triage_router::server::{AppState, ChatServer, ServiceInfo};
use triage_router::session::{InMemorySessionStore, SessionStore};

/// Multi-agent chat router for Azure support
#[derive(Parser)]
#[command(name = "triage-router")]
#[command(about = "Routes chat messages to specialised support agents and streams their answers")]
#[command(version)]
struct Cli {
    /// Configuration file path; falls back to router.toml, then environment variables
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting triage-router v{}", env!("CARGO_PKG_VERSION"));

    let (config, source) = match RouterConfig::load(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };
    info!(source = %source, "Configuration loaded");

    let result = match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Config { show } => handle_config_command(&config, &source, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

/// Provider factory for creating the hosted model client from configuration
struct LlmProviderFactory;

impl LlmProviderFactory {
    fn create_provider(
        config: &RouterConfig,
    ) -> Result<Arc<dyn LlmProvider>, Box<dyn std::error::Error>> {
        let api_key = config.get_llm_api_key()?;
        let provider = OpenAiProvider::new(OpenAiConfig::from_section(&config.llm, api_key))?;
        info!(
            provider = provider.name(),
            endpoint = %config.llm.endpoint,
            model = %config.llm.model,
            "LLM provider configured"
        );
        Ok(Arc::new(provider))
    }
}

async fn serve(config: RouterConfig) -> Result<(), Box<dyn std::error::Error>> {
    let provider = LlmProviderFactory::create_provider(&config)?;
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());

    let router = Arc::new(ChatRouter::from_config(
        &config,
        provider.clone(),
        store.clone(),
    ));
    info!(
        strategy = config.triage.strategy.as_str(),
        classifier = router.classifier().name(),
        "Triage configured"
    );

    let health = HealthCheckManager::new()
        .with_health_check(Box::new(LlmProviderHealthCheck::new(provider)))
        .with_health_check(Box::new(SessionStoreHealthCheck::new(store)));

    let state = AppState::new(router, health, ServiceInfo::from_config(&config));
    let server = ChatServer::new(state, &config.server.host, config.server.port)?;

    server
        .run(shutdown_signal())
        .await
        .map_err(|e| e as Box<dyn std::error::Error>)?;
    Ok(())
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down gracefully..."),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully..."),
    }
}

fn handle_config_command(
    config: &RouterConfig,
    source: &ConfigSource,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("# Configuration from {source}");
        println!("{}", config.to_toml_string()?);
    }

    if let Err(e) = config.get_llm_api_key() {
        warn!("{}; serve will fail until it is set", e);
    }

    info!("Configuration validation complete");
    Ok(())
}
