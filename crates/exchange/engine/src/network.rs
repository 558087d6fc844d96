//! [`Network`] over the dialer's [`Swarm`].

use std::sync::Arc;

use async_trait::async_trait;
use cairn_exchange_api::{MessageSink, Network, NetworkError};
use cairn_exchange_message::Message;
use cairn_net_dialer::{DefaultDialConfig, DialConfig, PeerBook, Swarm, Transport};
use cairn_primitives::PeerId;
use tracing::trace;

/// Sends exchange messages over connections owned by a [`Swarm`].
///
/// Every send goes through [`Swarm::dial`], which reuses an open connection
/// when there is one.
pub struct SwarmNetwork<T: Transport, B, C = DefaultDialConfig> {
    swarm: Arc<Swarm<T, B, C>>,
}

impl<T: Transport, B, C> SwarmNetwork<T, B, C> {
    /// Wrap `swarm`.
    pub fn new(swarm: Arc<Swarm<T, B, C>>) -> Self {
        Self { swarm }
    }

    /// The underlying swarm.
    pub fn swarm(&self) -> &Arc<Swarm<T, B, C>> {
        &self.swarm
    }
}

impl<T: Transport, B, C> Clone for SwarmNetwork<T, B, C> {
    fn clone(&self) -> Self {
        Self {
            swarm: Arc::clone(&self.swarm),
        }
    }
}

#[async_trait]
impl<T, B, C> Network for SwarmNetwork<T, B, C>
where
    T: Transport,
    T::Connection: MessageSink,
    B: PeerBook + 'static,
    C: DialConfig + 'static,
{
    fn local_peer(&self) -> PeerId {
        self.swarm.local_peer()
    }

    async fn connect(&self, peer: PeerId) -> Result<(), NetworkError> {
        self.swarm.dial(peer).await?;
        Ok(())
    }

    async fn send_message(&self, peer: PeerId, message: Message) -> Result<(), NetworkError> {
        let conn = self.swarm.dial(peer).await?;
        trace!(%peer, conn = %conn.id(), kind = %message.kind(), "sending message");
        conn.inner()
            .send_message(message)
            .map_err(|e| NetworkError::Send {
                peer,
                reason: e.to_string(),
            })
    }
}
