//! Session history: turns, summaries and the keyed store

pub mod store;
pub mod turn;

pub use store::{InMemorySessionStore, SessionStore};
pub use turn::{SessionSummary, Turn, TurnRole};
