//! Downstream agents: profiles and the streaming invoker

pub mod invoker;
pub mod profile;

pub use invoker::AgentInvoker;
pub use profile::{AgentProfile, AgentRegistry};
