//! LLM provider abstraction layer
//!
//! This module provides a provider-agnostic interface for hosted model calls,
//! including the token streams agents answer with.

pub mod provider;
pub mod providers;
pub mod sse;

pub use provider::*;
pub use providers::*;
