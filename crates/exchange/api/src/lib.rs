//! Interfaces the exchange engine consumes.
//!
//! The engine owns none of its collaborators. Block persistence, provider
//! discovery and message delivery are reached through the traits defined
//! here, so that each can be swapped for an in-memory version in tests.

mod network;
mod routing;
mod store;

pub use async_trait::async_trait;
pub use network::{MessageSink, Network, NetworkError};
pub use routing::Routing;
pub use store::{BlockStore, StoreError};
