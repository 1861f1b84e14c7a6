//! LLM provider implementations
//!
//! This module contains concrete implementations of the LlmProvider trait
//! for hosted chat-completion services.

pub mod openai;

pub use openai::*;
