use cairn_primitives::{BlockKey, PeerId};
use futures::stream::BoxStream;

/// Provider discovery.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait Routing: Send + Sync {
    /// Stream up to `limit` peers believed to hold `key`.
    ///
    /// The stream may stay pending indefinitely; callers bound it with their
    /// own search timeout.
    fn find_providers(&self, key: &BlockKey, limit: usize) -> BoxStream<'static, PeerId>;
}
