//! Outstanding wants and the handles callers await.

use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use cairn_primitives::{Block, BlockKey, PeerId};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use web_time::Instant;

use crate::ExchangeError;

/// Result delivered to every waiter of a want.
pub(crate) type WantResult = Result<Block, ExchangeError>;

/// Lifecycle state of a want.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum WantState {
    /// Registered, no provider has been sent the want yet.
    Unsent,
    /// At least one provider was sent the want.
    Sent,
    /// The block arrived.
    Fulfilled,
    /// Cancelled locally, by [`cancel_want`](crate::Exchange::cancel_want),
    /// by dropping every handle, or by shutdown.
    Cancelled,
    /// No provider delivered within the want timeout.
    TimedOut,
    /// The provider search came back empty or no provider could be reached.
    Unresolvable,
}

impl WantState {
    /// Whether the want is still waiting for its block.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Unsent | Self::Sent)
    }
}

/// Bookkeeping for one outstanding want.
#[derive(Debug)]
pub(crate) struct WantEntry {
    /// Request id sent with every `WANT_BLOCK` for this want.
    pub(crate) id: u64,
    pub(crate) state: WantState,
    pub(crate) waiters: Vec<oneshot::Sender<WantResult>>,
    /// Providers asked, in the order they were asked.
    pub(crate) providers: Vec<PeerId>,
    pub(crate) started: Instant,
    pub(crate) task: Option<AbortHandle>,
}

impl WantEntry {
    pub(crate) fn new(id: u64, waiter: oneshot::Sender<WantResult>) -> Self {
        Self {
            id,
            state: WantState::Unsent,
            waiters: vec![waiter],
            providers: Vec::new(),
            started: Instant::now(),
            task: None,
        }
    }

    /// Stop the pipeline task, if it is still running.
    pub(crate) fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    /// Hand `result` to every waiter still listening.
    pub(crate) fn resolve(self, result: WantResult) {
        for waiter in self.waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

/// Called by a dropped [`WantHandle`] so abandoned wants get cancelled.
pub(crate) trait Release: Send + Sync {
    fn release(&self, key: &BlockKey);
}

/// Future resolving to the wanted block.
///
/// Dropping the handle before it resolves withdraws this caller's interest;
/// the want itself is cancelled once no handle for the key is left.
#[must_use = "dropping a WantHandle withdraws the want"]
pub struct WantHandle {
    key: BlockKey,
    rx: oneshot::Receiver<WantResult>,
    release: Option<Weak<dyn Release>>,
    done: bool,
}

impl WantHandle {
    pub(crate) fn new(
        key: BlockKey,
        rx: oneshot::Receiver<WantResult>,
        release: Weak<dyn Release>,
    ) -> Self {
        Self {
            key,
            rx,
            release: Some(release),
            done: false,
        }
    }

    /// Handle that is already resolved with `block`.
    pub(crate) fn ready(block: Block) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(block.clone()));
        Self {
            key: block.key().clone(),
            rx,
            release: None,
            done: false,
        }
    }

    /// The wanted key.
    pub fn key(&self) -> &BlockKey {
        &self.key
    }
}

impl Future for WantHandle {
    type Output = WantResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => result,
            Poll::Ready(Err(_)) => Err(ExchangeError::Shutdown),
            Poll::Pending => return Poll::Pending,
        };
        self.done = true;
        Poll::Ready(result)
    }
}

impl Drop for WantHandle {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.rx.close();
        if let Some(release) = self.release.as_ref().and_then(Weak::upgrade) {
            release.release(&self.key);
        }
    }
}

impl std::fmt::Debug for WantHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WantHandle")
            .field("key", &self.key)
            .field("done", &self.done)
            .finish()
    }
}
