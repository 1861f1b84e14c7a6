//! Testing utilities and mock implementations
//!
//! Scripted providers and classifiers for exercising the router without a
//! hosted model.

pub mod mocks;

pub use mocks::*;
