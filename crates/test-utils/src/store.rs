use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use cairn_exchange_api::{BlockStore, StoreError};
use cairn_primitives::{Block, BlockKey};
use parking_lot::RwLock;

/// Block store backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<BlockKey, Block>>,
    puts: AtomicUsize,
}

impl MemoryBlockStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-filled with `blocks`.
    pub fn with_blocks(blocks: impl IntoIterator<Item = Block>) -> Self {
        let store = Self::default();
        store
            .blocks
            .write()
            .extend(blocks.into_iter().map(|b| (b.key().clone(), b)));
        store
    }

    /// Number of blocks held.
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }

    /// Number of `put` calls made.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::Relaxed)
    }
}

impl BlockStore for MemoryBlockStore {
    fn get(&self, key: &BlockKey) -> Result<Option<Block>, StoreError> {
        Ok(self.blocks.read().get(key).cloned())
    }

    fn put(&self, block: Block) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.blocks.write().insert(block.key().clone(), block);
        Ok(())
    }

    fn has(&self, key: &BlockKey) -> Result<bool, StoreError> {
        Ok(self.blocks.read().contains_key(key))
    }
}
