use cairn_primitives::{Block, BlockKey};

/// Errors from a [`BlockStore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend failed.
    #[error("block store backend error: {0}")]
    Backend(String),

    /// The block was refused (e.g. the store is read-only or full).
    #[error("block {key} rejected: {reason}")]
    Rejected {
        /// Key of the refused block.
        key: BlockKey,
        /// Why it was refused.
        reason: String,
    },
}

/// Persistent block storage. Only presence and absence matter to the exchange.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait BlockStore: Send + Sync {
    /// Fetch a block.
    fn get(&self, key: &BlockKey) -> Result<Option<Block>, StoreError>;

    /// Store a block. Storing a block that is already present is not an error.
    fn put(&self, block: Block) -> Result<(), StoreError>;

    /// Whether a block is present.
    fn has(&self, key: &BlockKey) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }
}
