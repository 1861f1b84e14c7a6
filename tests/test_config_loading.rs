//! Configuration loading and validation tests
//!
//! Covers file discovery, error reporting and the values a loaded file
//! hands to the rest of the service.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use triage_router::agents::AgentRegistry;
use triage_router::config::{ConfigError, ConfigSource, ProviderKind, RouterConfig, TriageStrategy};
use triage_router::triage::AgentLabel;

const FULL_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 9000
environment = "production"
frontend_url = "https://chat.example.com/"
cors_origins = ["https://admin.example.com"]

[llm]
provider = "azure"
endpoint = "https://contoso.openai.azure.com"
api_key_env = "CONTOSO_OPENAI_KEY"
model = "gpt-4o"
api_version = "2024-10-21"
timeout_secs = 30

[triage]
strategy = "llm"
model = "gpt-4o-mini"
max_retries = 1
retry_delay_ms = 100

[chat]
history_window = 10
stream_idle_timeout_secs = 45

[agents.escalation]
name = "BillingDesk"
temperature = 0.2

[agents.foundry-support]
model = "gpt-4o-foundry"
"#;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    write!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_explicit_file() {
    let temp_file = write_config(FULL_CONFIG);

    let (config, source) = RouterConfig::load(Some(temp_file.path())).unwrap();

    assert_eq!(source, ConfigSource::File(temp_file.path().to_path_buf()));
    assert_eq!(config.server.port, 9000);
    assert!(config.server.is_production());
    assert_eq!(config.llm.provider, ProviderKind::Azure);
    assert_eq!(config.llm.timeout_secs, 30);
    assert_eq!(config.triage.strategy, TriageStrategy::Llm);
    assert_eq!(config.triage_model(), "gpt-4o-mini");
    assert_eq!(config.chat.history_window, 10);
    assert_eq!(config.chat.stream_idle_timeout_secs, 45);
}

#[test]
fn test_agent_overrides_reach_the_registry() {
    let temp_file = write_config(FULL_CONFIG);
    let config = RouterConfig::load_from_file(temp_file.path()).unwrap();

    let registry = AgentRegistry::from_config(&config);

    let escalation = registry.get(AgentLabel::Escalation);
    assert_eq!(escalation.name, "BillingDesk");
    assert_eq!(escalation.temperature, Some(0.2));
    assert!(!escalation.instructions.is_empty());

    let foundry = registry.get(AgentLabel::FoundrySupport);
    assert_eq!(foundry.model.as_deref(), Some("gpt-4o-foundry"));

    let technical = registry.get(AgentLabel::TechnicalSupport);
    assert_eq!(technical.name, "TechnicalSupportAgent");
}

#[test]
fn test_production_origins_exclude_localhost() {
    let config = RouterConfig::from_toml_str(FULL_CONFIG).unwrap();

    let origins = config.server.allowed_origins();

    assert_eq!(origins[0], "https://chat.example.com");
    assert!(origins.contains(&"https://admin.example.com".to_string()));
    assert!(!origins.iter().any(|o| o.contains("localhost")));
}

#[test]
fn test_missing_file_is_a_read_error() {
    let result = RouterConfig::load(Some(Path::new("/definitely/not/here/router.toml")));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_invalid_toml_is_a_parse_error() {
    let temp_file = write_config("[llm\nendpoint = ");
    let result = RouterConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_missing_required_field_is_a_parse_error() {
    let temp_file = write_config(
        r#"
[llm]
endpoint = "https://contoso.openai.azure.com"
"#,
    );
    let result = RouterConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_non_http_endpoint_is_rejected() {
    let temp_file = write_config(
        r#"
[llm]
endpoint = "ftp://contoso.openai.azure.com"
api_key_env = "KEY"
"#,
    );
    let result = RouterConfig::load_from_file(temp_file.path());
    assert!(matches!(result, Err(ConfigError::InvalidUrl { .. })));
}

#[test]
fn test_unknown_triage_strategy_is_rejected() {
    let result = RouterConfig::from_toml_str(
        r#"
[llm]
endpoint = "https://contoso.openai.azure.com"
api_key_env = "KEY"

[triage]
strategy = "coin-flip"
"#,
    );
    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_zero_idle_timeout_is_rejected() {
    let result = RouterConfig::from_toml_str(
        r#"
[llm]
endpoint = "https://contoso.openai.azure.com"
api_key_env = "KEY"

[chat]
stream_idle_timeout_secs = 0
"#,
    );
    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_api_key_is_resolved_from_named_variable() {
    let config = RouterConfig::from_toml_str(
        r#"
[llm]
endpoint = "https://contoso.openai.azure.com"
api_key_env = "TRIAGE_ROUTER_TEST_KEY_PRESENT"
"#,
    )
    .unwrap();

    std::env::set_var("TRIAGE_ROUTER_TEST_KEY_PRESENT", "sk-test");
    assert_eq!(config.get_llm_api_key().unwrap(), "sk-test");
    std::env::remove_var("TRIAGE_ROUTER_TEST_KEY_PRESENT");
}

#[test]
fn test_missing_api_key_variable_is_reported_by_name() {
    let config = RouterConfig::from_toml_str(
        r#"
[llm]
endpoint = "https://contoso.openai.azure.com"
api_key_env = "TRIAGE_ROUTER_TEST_KEY_ABSENT"
"#,
    )
    .unwrap();

    match config.get_llm_api_key() {
        Err(ConfigError::EnvVarNotFound(name)) => {
            assert_eq!(name, "TRIAGE_ROUTER_TEST_KEY_ABSENT")
        }
        other => panic!("expected EnvVarNotFound, got {other:?}"),
    }
}

#[test]
fn test_rendered_config_parses_back() {
    let config = RouterConfig::from_toml_str(FULL_CONFIG).unwrap();

    let rendered = config.to_toml_string().unwrap();
    let reparsed = RouterConfig::from_toml_str(&rendered).unwrap();

    assert_eq!(reparsed, config);
    assert!(!rendered.contains("sk-"));
}

#[test]
fn test_environment_fallback_builds_azure_config() {
    let config = RouterConfig::from_env_with(|name| match name {
        "AZURE_OPENAI_ENDPOINT" => Some("https://contoso.openai.azure.com".to_string()),
        "AZURE_OPENAI_DEPLOYMENT_NAME" => Some("gpt-4o".to_string()),
        "PORT" => Some("8080".to_string()),
        "TRIAGE_STRATEGY" => Some("keyword".to_string()),
        _ => None,
    })
    .unwrap();

    assert_eq!(config.server.port, 8080);
    assert_eq!(config.llm.model, "gpt-4o");
    assert_eq!(config.llm.api_key_env, "AZURE_OPENAI_API_KEY");
    assert_eq!(config.triage.strategy, TriageStrategy::Keyword);
}
