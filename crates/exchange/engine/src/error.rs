use cairn_exchange_api::{NetworkError, StoreError};
use cairn_exchange_message::MessageError;
use cairn_primitives::{BlockKey, PeerId};

/// Exchange errors. Cloned to every waiter of a want.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    /// The provider search ended without a single candidate.
    #[error("no providers found for {key}")]
    NotFound {
        /// Wanted block.
        key: BlockKey,
    },

    /// Providers were found but none could be sent the want.
    #[error("block {key} unresolvable: {providers} provider(s) tried")]
    Unresolvable {
        /// Wanted block.
        key: BlockKey,
        /// Providers contacted.
        providers: usize,
        /// Error from the last provider tried.
        last: Option<NetworkError>,
    },

    /// The want was cancelled.
    #[error("want for {key} cancelled")]
    Cancelled {
        /// Wanted block.
        key: BlockKey,
    },

    /// No provider delivered the block in time.
    #[error("want for {key} timed out: {providers} provider(s) asked")]
    TimedOut {
        /// Wanted block.
        key: BlockKey,
        /// Providers the want reached.
        providers: usize,
    },

    /// Inbound message missing required fields.
    #[error(transparent)]
    Malformed(#[from] MessageError),

    /// Received data does not hash to its key.
    #[error("block from {peer} does not match key {key}")]
    InvalidBlock {
        /// Claimed key.
        key: BlockKey,
        /// Sender.
        peer: PeerId,
    },

    /// Block store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Network failure.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// The exchange has been shut down.
    #[error("exchange is shut down")]
    Shutdown,
}
