//! Triage: deciding which agent answers a message
//!
//! The agent selection is a closed enum ([`AgentLabel`]) with an explicit
//! fallback, and the decision itself sits behind the [`Classifier`] trait so
//! the hosted-model classifier can be swapped for rules in tests or in
//! agentless deployments.

pub mod classifier;
pub mod label;
pub mod schema;

pub use classifier::{
    classifier_from_config, Classifier, FixedClassifier, KeywordClassifier, LlmClassifier,
};
pub use label::{AgentLabel, UnknownLabel};
pub use schema::TriageDecisionOutput;
