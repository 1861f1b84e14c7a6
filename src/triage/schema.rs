//! Structured output schema for triage decisions
//!
//! The classifier asks the hosted model for a JSON object matching this
//! schema. Models do not always comply, so parsing of the reply stays lenient
//! (see [`AgentLabel::parse_lenient`]).

use crate::llm::provider::{JsonSchemaDefinition, ResponseFormat};
use crate::triage::label::AgentLabel;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Triage decision returned by the classifier model
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriageDecisionOutput {
    /// Agent that should answer the user's message
    pub agent: AgentLabel,

    /// Short justification, logged for debugging
    pub reasoning: String,
}

impl TriageDecisionOutput {
    /// Generate the JSON schema for this structure
    pub fn json_schema() -> serde_json::Value {
        let schema = schemars::schema_for!(TriageDecisionOutput);
        serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }

    /// Structured-output response format carrying this schema
    pub fn response_format() -> ResponseFormat {
        ResponseFormat::JsonSchema {
            json_schema: JsonSchemaDefinition {
                name: "triage_decision".to_string(),
                strict: None,
                schema: Self::json_schema(),
            },
        }
    }
}
