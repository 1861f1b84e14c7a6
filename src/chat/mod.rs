//! Chat turns: request intake, dispatch and event relay

pub mod events;
pub mod router;

pub use events::{ChatEvent, ChatEventKind, ChatRequest};
pub use router::{ChatRouter, ChatTurn, RouterSettings};
