//! Triage Router
//!
//! A multi-agent chat router for Azure-support questions. Each incoming
//! message is classified by a hosted model into one of a fixed set of agents
//! (technical support, escalation, Foundry support); the chosen agent's
//! answer streams back to the caller as server-sent events while the
//! conversation is kept in a session store and replayed as context.
//!
//! # Overview
//!
//! - [`triage`]: agent labels and the pluggable [`triage::Classifier`]
//! - [`agents`]: agent profiles and the streaming [`agents::AgentInvoker`]
//! - [`session`]: turns and the keyed [`session::SessionStore`]
//! - [`chat`]: the [`chat::ChatRouter`] dispatcher and its event types
//! - [`server`]: the warp HTTP API
//! - [`llm`]: the OpenAI-compatible (Azure or OpenAI) provider
//!
//! # Quick Start
//!
//! ```rust
//! use triage_router::chat::ChatEvent;
//! use triage_router::triage::AgentLabel;
//!
//! let label = AgentLabel::parse_lenient(r#"{"agent": "escalation", "reasoning": "billing"}"#);
//! assert_eq!(label, AgentLabel::Escalation);
//!
//! let event = ChatEvent::start("session-1", label);
//! let json = serde_json::to_string(&event).unwrap();
//! assert_eq!(json, r#"{"type":"start","message":"escalation","session_id":"session-1"}"#);
//! ```

pub mod agents;
pub mod chat;
pub mod config;
pub mod error;
pub mod health;
pub mod llm;
pub mod observability;
pub mod server;
pub mod session;
pub mod testing;
pub mod triage;

pub use chat::{ChatEvent, ChatEventKind, ChatRequest, ChatRouter, ChatTurn};
pub use config::{ConfigError, RouterConfig};
pub use error::{RouterError, RouterResult};
pub use session::{InMemorySessionStore, SessionStore, Turn};
pub use triage::AgentLabel;
