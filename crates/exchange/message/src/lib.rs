//! Block exchange messages.
//!
//! A [`Message`] is one exchange unit between two peers: a request for a
//! block (`WANT_BLOCK`, or a direct `GET_BLOCK`), or a `GET_BLOCK` response
//! carrying the block data. Messages optionally carry the sender's full
//! want-list.
//!
//! On the wire messages are length-prefixed protobuf frames, see
//! [`MessageCodec`]. Decoding validates the required fields and rejects
//! malformed frames with [`MessageError::Malformed`].

mod codec;
mod message;
pub mod proto;

pub use codec::{CodecError, MAX_MESSAGE_SIZE, MessageCodec};
pub use message::{Message, MessageError, MessageType};

/// Protocol name for the block exchange.
pub const PROTOCOL_NAME: &str = "/cairn/exchange/1.0.0";
