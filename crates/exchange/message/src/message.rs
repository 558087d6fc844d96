//! Typed exchange messages.

use bytes::Bytes;
use cairn_primitives::{Block, BlockKey};

use crate::proto;

/// Errors produced while validating a decoded frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// A required field was absent or empty.
    #[error("malformed message: missing {field}")]
    Malformed {
        /// Name of the missing field.
        field: &'static str,
    },
}

/// Kind of exchange message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::FromRepr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum MessageType {
    /// Direct block request, or (with `response` set) the block delivery.
    GetBlock = 0,
    /// Declaration of interest in a block.
    WantBlock = 1,
}

impl From<proto::mod_Message::MessageType> for MessageType {
    fn from(value: proto::mod_Message::MessageType) -> Self {
        match value {
            proto::mod_Message::MessageType::GET_BLOCK => Self::GetBlock,
            proto::mod_Message::MessageType::WANT_BLOCK => Self::WantBlock,
        }
    }
}

impl From<MessageType> for proto::mod_Message::MessageType {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::GetBlock => Self::GET_BLOCK,
            MessageType::WantBlock => Self::WANT_BLOCK,
        }
    }
}

/// One exchange unit between two peers.
///
/// Messages are immutable once built; use the constructors to get the flag
/// combinations the engine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageType,
    id: u64,
    key: BlockKey,
    value: Option<Bytes>,
    response: Option<bool>,
    success: Option<bool>,
    wantlist: Vec<BlockKey>,
}

impl Message {
    /// Declare interest in `key`, optionally attaching the full want-list.
    pub fn want_block(id: u64, key: BlockKey, wantlist: Vec<BlockKey>) -> Self {
        Self {
            kind: MessageType::WantBlock,
            id,
            key,
            value: None,
            response: None,
            success: None,
            wantlist,
        }
    }

    /// Ask directly for `key`.
    pub fn get_block(id: u64, key: BlockKey) -> Self {
        Self {
            kind: MessageType::GetBlock,
            id,
            key,
            value: None,
            response: Some(false),
            success: None,
            wantlist: Vec::new(),
        }
    }

    /// Deliver a block in response to request `id`.
    pub fn block(id: u64, block: Block) -> Self {
        let (key, data) = block.into_parts();
        Self {
            kind: MessageType::GetBlock,
            id,
            key,
            value: Some(data),
            response: Some(true),
            success: Some(true),
            wantlist: Vec::new(),
        }
    }

    /// Tell the requester of `id` that `key` is not available here.
    pub fn not_found(id: u64, key: BlockKey) -> Self {
        Self {
            kind: MessageType::GetBlock,
            id,
            key,
            value: None,
            response: Some(true),
            success: Some(false),
            wantlist: Vec::new(),
        }
    }

    /// Message kind.
    pub fn kind(&self) -> MessageType {
        self.kind
    }

    /// Request id, scoped to the sending peer.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Content key the message is about.
    pub fn key(&self) -> &BlockKey {
        &self.key
    }

    /// Block payload, if any.
    pub fn value(&self) -> Option<&Bytes> {
        self.value.as_ref()
    }

    /// Whether this message answers an earlier request.
    pub fn is_response(&self) -> bool {
        self.response.unwrap_or(false)
    }

    /// Raw `success` flag.
    pub fn success(&self) -> Option<bool> {
        self.success
    }

    /// Sender's want-list carried alongside the message.
    pub fn wantlist(&self) -> &[BlockKey] {
        &self.wantlist
    }

    /// Whether the message asks the receiver for a block.
    pub fn is_request(&self) -> bool {
        match self.kind {
            MessageType::WantBlock => true,
            MessageType::GetBlock => !self.is_response() && self.value.is_none(),
        }
    }

    /// The delivered block, if this is a `GET_BLOCK` carrying a value.
    pub fn delivered_block(&self) -> Option<Block> {
        match (self.kind, &self.value) {
            (MessageType::GetBlock, Some(value)) => {
                Some(Block::with_key(self.key.clone(), value.clone()))
            }
            _ => None,
        }
    }

    /// Payload size in bytes (zero without a value).
    pub fn value_len(&self) -> usize {
        self.value.as_ref().map_or(0, Bytes::len)
    }
}

impl TryFrom<proto::Message> for Message {
    type Error = MessageError;

    fn try_from(value: proto::Message) -> Result<Self, Self::Error> {
        let kind = value
            .type_pb
            .ok_or(MessageError::Malformed { field: "type" })?;
        let id = value.id.ok_or(MessageError::Malformed { field: "id" })?;
        let key = value
            .key
            .filter(|k| !k.is_empty())
            .ok_or(MessageError::Malformed { field: "key" })?;

        Ok(Self {
            kind: kind.into(),
            id,
            key: BlockKey::new(key),
            value: value.value.map(Bytes::from),
            response: value.response,
            success: value.success,
            wantlist: value
                .wantlist
                .into_iter()
                .filter(|k| !k.is_empty())
                .map(BlockKey::new)
                .collect(),
        })
    }
}

impl From<Message> for proto::Message {
    fn from(value: Message) -> Self {
        proto::Message {
            type_pb: Some(value.kind.into()),
            id: Some(value.id),
            key: Some(value.key.into_string()),
            value: value.value.map(|v| v.to_vec()),
            response: value.response,
            success: value.success,
            wantlist: value
                .wantlist
                .into_iter()
                .map(BlockKey::into_string)
                .collect(),
        }
    }
}
