//! Core primitive types for the Cairn block exchange.
//!
//! This crate keeps the shared vocabulary small: content keys, blocks, and
//! re-exports of the libp2p identity and addressing types used on the
//! network boundary.
//!
//! # Types
//!
//! - [`BlockKey`] - Content address of an immutable block
//! - [`Block`] - A block's key together with its data
//! - [`PeerId`] - libp2p peer identifier
//! - [`Multiaddr`] - libp2p network address

mod block;
mod key;

pub use block::Block;
pub use key::BlockKey;

// Re-export libp2p identity and addressing for the network boundary
pub use libp2p::{Multiaddr, PeerId};
