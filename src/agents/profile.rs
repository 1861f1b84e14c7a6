//! Agent profiles: the instructions and sampling settings behind each label

use crate::config::RouterConfig;
use crate::triage::AgentLabel;
use serde::Serialize;

const TECHNICAL_SUPPORT_INSTRUCTIONS: &str = "You are a helpful AI assistant specialized in Azure cloud services and technical support.

You can help users with:
- Azure services troubleshooting and configuration
- Best practices and recommendations
- Error message explanations and solutions
- General cloud computing questions
- Development and deployment guidance

When responding:
- Provide clear, accurate, and helpful information
- Give step-by-step guidance when appropriate
- Suggest relevant Azure documentation when available
- Be honest about limitations and recommend escalation when needed
- Maintain a friendly and professional tone";

const ESCALATION_INSTRUCTIONS: &str = "You are an agent specializing in escalation to human operators.

Handle the following cases:
- Complex issues that cannot be resolved by technical support
- Billing and account-related issues
- Cases requiring enterprise support
- High-priority urgent issues
- Cases requiring custom development or consulting

Provide users with the following information:
1. Problem overview and background
2. Appropriate support channels (Azure Portal, Microsoft Support, sales representatives, etc.)
3. Information required for escalation
4. Expected response time

Maintain a kind and understanding approach, and guide users to receive appropriate support.";

const FOUNDRY_SUPPORT_INSTRUCTIONS: &str = "You are a technical support specialist for Azure AI Foundry.

You can help users with:
- Foundry hubs, projects and connected resources
- Model catalog, deployments and quota
- Azure AI Agent Service, prompt flow and evaluation
- Networking, private endpoints and identity for Foundry resources

When responding:
- Identify the Foundry resource or feature involved before proposing a fix
- Give step-by-step guidance referencing the Foundry portal or SDK
- Call out when a problem is likely caused by network restrictions such as private endpoints
- Recommend escalation for billing, quota increases or outages";

/// Everything needed to call one downstream agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentProfile {
    pub label: AgentLabel,
    /// Display name used in logs
    pub name: String,
    /// System prompt sent ahead of the conversation
    pub instructions: String,
    /// Model or deployment override; `None` uses the provider default
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl AgentProfile {
    /// Built-in profile for a label
    pub fn builtin(label: AgentLabel) -> Self {
        let (name, instructions) = match label {
            AgentLabel::TechnicalSupport => ("TechnicalSupportAgent", TECHNICAL_SUPPORT_INSTRUCTIONS),
            AgentLabel::Escalation => ("EscalationAgent", ESCALATION_INSTRUCTIONS),
            AgentLabel::FoundrySupport => ("FoundrySupportAgent", FOUNDRY_SUPPORT_INSTRUCTIONS),
        };

        Self {
            label,
            name: name.to_string(),
            instructions: instructions.to_string(),
            model: None,
            temperature: Some(0.7),
            max_tokens: Some(1500),
        }
    }
}

/// Lookup of profiles by label. Always holds one profile per label.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    profiles: [AgentProfile; 3],
}

fn slot(label: AgentLabel) -> usize {
    match label {
        AgentLabel::TechnicalSupport => 0,
        AgentLabel::Escalation => 1,
        AgentLabel::FoundrySupport => 2,
    }
}

impl AgentRegistry {
    /// Registry with only the built-in profiles
    pub fn builtin() -> Self {
        Self {
            profiles: AgentLabel::ALL.map(AgentProfile::builtin),
        }
    }

    /// Built-in profiles with `[agents.<label>]` overrides applied
    pub fn from_config(config: &RouterConfig) -> Self {
        let mut registry = Self::builtin();
        for label in AgentLabel::ALL {
            let Some(overrides) = config.agent_override(label) else {
                continue;
            };
            let profile = &mut registry.profiles[slot(label)];
            if let Some(name) = &overrides.name {
                profile.name = name.clone();
            }
            if let Some(instructions) = &overrides.instructions {
                profile.instructions = instructions.clone();
            }
            if overrides.model.is_some() {
                profile.model = overrides.model.clone();
            }
            if overrides.temperature.is_some() {
                profile.temperature = overrides.temperature;
            }
            if overrides.max_tokens.is_some() {
                profile.max_tokens = overrides.max_tokens;
            }
        }
        registry
    }

    /// Replace one profile
    pub fn with_profile(mut self, profile: AgentProfile) -> Self {
        let index = slot(profile.label);
        self.profiles[index] = profile;
        self
    }

    pub fn get(&self, label: AgentLabel) -> &AgentProfile {
        &self.profiles[slot(label)]
    }

    pub fn profiles(&self) -> impl Iterator<Item = &AgentProfile> {
        self.profiles.iter()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_covers_every_label() {
        let registry = AgentRegistry::builtin();
        for label in AgentLabel::ALL {
            let profile = registry.get(label);
            assert_eq!(profile.label, label);
            assert!(!profile.instructions.is_empty());
        }
        assert_eq!(registry.profiles().count(), 3);
    }

    #[test]
    fn test_escalation_instructions_mention_support_channels() {
        let profile = AgentProfile::builtin(AgentLabel::Escalation);
        assert!(profile.instructions.contains("support channels"));
        assert_eq!(profile.name, "EscalationAgent");
    }

    #[test]
    fn test_config_overrides_apply() {
        let config = RouterConfig::from_toml_str(
            r#"
[llm]
endpoint = "https://example.openai.azure.com"
api_key_env = "KEY"

[agents.foundry-support]
instructions = "Only answer Foundry questions."
model = "gpt-4o-foundry"
max_tokens = 500
"#,
        )
        .unwrap();

        let registry = AgentRegistry::from_config(&config);
        let foundry = registry.get(AgentLabel::FoundrySupport);
        assert_eq!(foundry.instructions, "Only answer Foundry questions.");
        assert_eq!(foundry.model.as_deref(), Some("gpt-4o-foundry"));
        assert_eq!(foundry.max_tokens, Some(500));
        assert_eq!(foundry.temperature, Some(0.7));
        assert_eq!(foundry.name, "FoundrySupportAgent");

        let technical = registry.get(AgentLabel::TechnicalSupport);
        assert_eq!(technical, &AgentProfile::builtin(AgentLabel::TechnicalSupport));
    }
}
