//! Agent labels produced by triage

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Downstream agent a message is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AgentLabel {
    /// General Azure technical support
    TechnicalSupport,
    /// Hand-off guidance to human support channels
    Escalation,
    /// Azure AI Foundry specific support
    FoundrySupport,
}

impl AgentLabel {
    /// Every label, in prompt order
    pub const ALL: [AgentLabel; 3] = [
        AgentLabel::TechnicalSupport,
        AgentLabel::Escalation,
        AgentLabel::FoundrySupport,
    ];

    /// Label used whenever classifier output cannot be understood
    pub const DEFAULT: AgentLabel = AgentLabel::TechnicalSupport;

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentLabel::TechnicalSupport => "technical-support",
            AgentLabel::Escalation => "escalation",
            AgentLabel::FoundrySupport => "foundry-support",
        }
    }

    /// Parse free-form model output into a label, falling back to the default.
    ///
    /// Accepts the exact label, common spellings (`technical_support`,
    /// `TechnicalSupport`), a JSON object with an `agent` field, or prose that
    /// mentions exactly one label.
    pub fn parse_lenient(output: &str) -> AgentLabel {
        Self::try_parse_lenient(output).unwrap_or(Self::DEFAULT)
    }

    /// Like [`AgentLabel::parse_lenient`] but reports when no label was found
    pub fn try_parse_lenient(output: &str) -> Option<AgentLabel> {
        let trimmed = output.trim();
        if let Ok(label) = trimmed.parse::<AgentLabel>() {
            return Some(label);
        }

        if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(agent) = value.get("agent").and_then(|a| a.as_str()) {
                return agent.parse().ok();
            }
        }

        let mentioned: Vec<AgentLabel> = LABEL_MENTION
            .find_iter(trimmed)
            .filter_map(|m| m.as_str().parse().ok())
            .collect();
        match mentioned.first() {
            Some(first) if mentioned.iter().all(|l| l == first) => Some(*first),
            _ => None,
        }
    }
}

static LABEL_MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(technical[-_ ]?support|escalation|foundry[-_ ]?support)\b")
        .expect("label pattern is valid")
});

impl Default for AgentLabel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for AgentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for strict label parsing
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Unknown agent label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for AgentLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "technicalsupport" => Ok(AgentLabel::TechnicalSupport),
            "escalation" => Ok(AgentLabel::Escalation),
            "foundrysupport" => Ok(AgentLabel::FoundrySupport),
            _ => Err(UnknownLabel(s.to_string())),
        }
    }
}
