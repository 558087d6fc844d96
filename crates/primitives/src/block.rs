//! Immutable data blocks.

use bytes::Bytes;

use crate::BlockKey;

/// An immutable block: its content key and data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    key: BlockKey,
    data: Bytes,
}

impl Block {
    /// Create a block from its data, deriving the content key.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            key: BlockKey::for_data(&data),
            data,
        }
    }

    /// Create a block with an externally supplied key.
    ///
    /// The key is not checked against the data; see [`Block::is_valid`].
    pub fn with_key(key: BlockKey, data: impl Into<Bytes>) -> Self {
        Self {
            key,
            data: data.into(),
        }
    }

    /// The block's content key.
    pub fn key(&self) -> &BlockKey {
        &self.key
    }

    /// The block data.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Size of the block data in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the block carries no data.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the data hashes to the block's key.
    pub fn is_valid(&self) -> bool {
        self.key.matches(&self.data)
    }

    /// Split into key and data.
    pub fn into_parts(self) -> (BlockKey, Bytes) {
        (self.key, self.data)
    }
}
