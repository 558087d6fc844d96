//! Exchanges talking to each other through an in-memory hub.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use cairn_exchange::{Exchange, ExchangeArgs, ExchangeError, SwarmNetwork, WantHandle, WantState};
use cairn_exchange_api::{Network, NetworkError};
use cairn_exchange_ledger::{FnStrategy, Ledger};
use cairn_exchange_message::{Message, proto};
use cairn_exchange_tracker::AdjusterArgs;
use cairn_net_dialer::{DialArgs, DialError, Swarm};
use cairn_observability::init_test_tracing;
use cairn_primitives::{Block, BlockKey, PeerId};
use cairn_test_utils::{
    DialBehaviour, Inbox, MemoryBlockStore, MemoryHub, MemoryNetwork, MemoryPeerBook,
    MockRouting, MockTransport, memory_addr, peer_id,
};

type TestExchange = Exchange<Arc<MemoryNetwork>, Arc<MockRouting>, Arc<MemoryBlockStore>>;

struct Node {
    peer: PeerId,
    exchange: TestExchange,
    network: Arc<MemoryNetwork>,
    store: Arc<MemoryBlockStore>,
}

impl Node {
    fn bytes_recv(&self, from: &PeerId) -> u64 {
        self.exchange
            .ledger_snapshot(from)
            .map_or(0, |s| s.accounting.bytes_recv)
    }

    fn wants_from(&self, partner: &PeerId) -> usize {
        self.exchange
            .ledger_snapshot(partner)
            .map_or(0, |s| s.wants)
    }
}

/// Spawn a task feeding `inbox` into `exchange`.
fn pump(exchange: TestExchange, mut inbox: Inbox) {
    tokio::spawn(async move {
        while let Some((from, message)) = inbox.recv().await {
            let _ = exchange.receive_message(from, message).await;
        }
    });
}

fn node(
    hub: &Arc<MemoryHub>,
    routing: &Arc<MockRouting>,
    seed: u8,
    blocks: Vec<Block>,
    args: ExchangeArgs,
) -> Node {
    let peer = peer_id(seed);
    let (network, inbox) = hub.join(peer);
    let network = Arc::new(network);
    let store = Arc::new(MemoryBlockStore::with_blocks(blocks));
    let exchange = Exchange::new(
        Arc::clone(&network),
        Arc::clone(routing),
        Arc::clone(&store),
        args,
    );
    pump(exchange.clone(), inbox);
    Node {
        peer,
        exchange,
        network,
        store,
    }
}

fn block(data: &'static str) -> Block {
    Block::new(data.as_bytes())
}

async fn resolve(handle: WantHandle) -> Result<Block, ExchangeError> {
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("want did not resolve")
}

/// Poll `cond` until it holds.
async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never held");
}

#[tokio::test]
async fn test_fetch_from_provider() {
    init_test_tracing();
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let data = block("hello world");

    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());
    let b = node(&hub, &routing, 2, vec![data.clone()], ExchangeArgs::default());
    routing.add_provider(data.key().clone(), b.peer);

    let got = resolve(a.exchange.want_block(data.key().clone()).unwrap())
        .await
        .unwrap();
    assert_eq!(got, data);

    // Requester side: block stored, bytes accounted, want finished.
    assert_eq!(a.store.len(), 1);
    assert_eq!(a.bytes_recv(&b.peer), data.len() as u64);
    assert_eq!(a.exchange.want_state(data.key()), Some(WantState::Fulfilled));
    assert!(a.exchange.wantlist().is_empty());

    // Provider side: bytes sent and the served want removed.
    eventually(|| b.exchange.ledger_snapshot(&a.peer).is_some_and(|s| s.accounting.bytes_sent > 0)).await;
    let served = b.exchange.ledger_snapshot(&a.peer).unwrap();
    assert_eq!(served.accounting.bytes_sent, data.len() as u64);
    assert_eq!(served.wants, 0);

    // The want carried the requester's want-list.
    let sent = a.network.sent_to(&b.peer);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].wantlist(), &[data.key().clone()]);
    assert_eq!(routing.queries(), vec![(data.key().clone(), 20)]);
}

#[tokio::test]
async fn test_late_duplicate_from_second_provider_is_dropped() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let data = block("fan out");
    let args = ExchangeArgs {
        fanout: AdjusterArgs {
            initial: 2,
            ..Default::default()
        },
        ..Default::default()
    };

    let a = node(&hub, &routing, 1, vec![], args);
    let b = node(&hub, &routing, 2, vec![data.clone()], ExchangeArgs::default());
    let c = node(&hub, &routing, 3, vec![data.clone()], ExchangeArgs::default());
    routing.add_provider(data.key().clone(), b.peer);
    routing.add_provider(data.key().clone(), c.peer);

    assert_eq!(a.exchange.fanout(), 2);
    let got = resolve(a.exchange.want_block(data.key().clone()).unwrap())
        .await
        .unwrap();
    assert_eq!(got, data);

    // Both providers were asked and both answered.
    assert_eq!(a.network.sent_to(&b.peer).len(), 1);
    assert_eq!(a.network.sent_to(&c.peer).len(), 1);
    eventually(|| a.exchange.tracker().summary().average_redundant == 1.0).await;

    // Only the first delivery was accounted.
    let received = a.bytes_recv(&b.peer) + a.bytes_recv(&c.peer);
    assert_eq!(received, data.len() as u64);
    assert_eq!(a.store.put_count(), 1);
}

#[tokio::test]
async fn test_repeated_delivery_fulfills_once() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let data = block("idempotent");
    routing.stall(data.key().clone());

    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());
    let sender = peer_id(2);
    let handle = a.exchange.want_block(data.key().clone()).unwrap();

    for _ in 0..3 {
        a.exchange
            .receive_message(sender, Message::block(1, data.clone()))
            .await
            .unwrap();
    }

    assert_eq!(resolve(handle).await.unwrap(), data);
    let ledger = a.exchange.ledger_snapshot(&sender).unwrap();
    assert_eq!(ledger.accounting.bytes_recv, data.len() as u64);
    assert_eq!(ledger.exchange_count, 1);
    assert_eq!(a.exchange.want_state(data.key()), Some(WantState::Fulfilled));
    assert_eq!(a.exchange.tracker().summary().average_redundant, 2.0);
}

#[tokio::test(start_paused = true)]
async fn test_want_times_out() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let key = BlockKey::for_data(b"nobody has this");
    let args = ExchangeArgs {
        want_timeout_secs: 2,
        ..Default::default()
    };

    let a = node(&hub, &routing, 1, vec![], args);
    let b = node(&hub, &routing, 2, vec![], ExchangeArgs::default());
    routing.add_provider(key.clone(), b.peer);

    let handle = a.exchange.want_block(key.clone()).unwrap();
    assert_matches!(
        handle.await,
        Err(ExchangeError::TimedOut { key: k, providers: 1 }) if k == key
    );
    assert_eq!(a.exchange.want_state(&key), Some(WantState::TimedOut));

    // The provider kept the want on record and stayed silent.
    assert_eq!(b.wants_from(&a.peer), 1);
    assert!(b.network.sent().is_empty());
}

#[tokio::test]
async fn test_no_providers_is_not_found() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let key = BlockKey::for_data(b"unknown");
    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());

    let result = resolve(a.exchange.want_block(key.clone()).unwrap()).await;
    assert_matches!(result, Err(ExchangeError::NotFound { .. }));
    assert_eq!(a.exchange.want_state(&key), Some(WantState::Unresolvable));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_search_gives_up_at_deadline() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let key = BlockKey::for_data(b"slow routing");
    routing.stall(key.clone());
    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());

    let started = tokio::time::Instant::now();
    let result = a.exchange.want_block(key).unwrap().await;
    assert_matches!(result, Err(ExchangeError::NotFound { .. }));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
}

#[tokio::test]
async fn test_self_is_never_a_provider() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let key = BlockKey::for_data(b"only me");
    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());
    routing.add_provider(key.clone(), a.peer);

    let result = resolve(a.exchange.want_block(key).unwrap()).await;
    assert_matches!(result, Err(ExchangeError::NotFound { .. }));
    assert_eq!(a.network.connect_count(), 0);
}

#[tokio::test]
async fn test_unreachable_providers_are_unresolvable() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let data = block("behind a wall");

    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());
    let b = node(&hub, &routing, 2, vec![data.clone()], ExchangeArgs::default());
    routing.add_provider(data.key().clone(), b.peer);
    hub.set_unreachable(b.peer);

    let result = resolve(a.exchange.want_block(data.key().clone()).unwrap()).await;
    assert_matches!(
        result,
        Err(ExchangeError::Unresolvable {
            providers: 1,
            last: Some(NetworkError::Dial(DialError::NoUsableAddresses { .. })),
            ..
        })
    );
    assert_eq!(a.exchange.want_state(data.key()), Some(WantState::Unresolvable));
}

#[tokio::test]
async fn test_unreachable_provider_is_replaced() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let data = block("second try");

    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());
    let b = node(&hub, &routing, 2, vec![data.clone()], ExchangeArgs::default());
    let c = node(&hub, &routing, 3, vec![data.clone()], ExchangeArgs::default());
    routing.add_provider(data.key().clone(), b.peer);
    routing.add_provider(data.key().clone(), c.peer);
    hub.set_unreachable(b.peer);

    let got = resolve(a.exchange.want_block(data.key().clone()).unwrap())
        .await
        .unwrap();
    assert_eq!(got, data);
    assert_eq!(a.bytes_recv(&c.peer), data.len() as u64);
    assert_eq!(a.network.connect_count(), 2);
}

#[tokio::test]
async fn test_strategy_refusal_withholds_block() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let data = block("members only");

    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());
    let b = node(&hub, &routing, 2, vec![data.clone()], ExchangeArgs::default());
    b.exchange
        .set_peer_strategy(a.peer, Arc::new(FnStrategy::new(|_: &Ledger| false)));
    routing.add_provider(data.key().clone(), b.peer);

    let handle = a.exchange.want_block(data.key().clone()).unwrap();
    eventually(|| b.wants_from(&a.peer) == 1).await;
    assert!(b.network.sent_to(&a.peer).is_empty());
    assert_eq!(a.exchange.want_state(data.key()), Some(WantState::Sent));

    // Lifting the restriction and re-announcing the block serves the want.
    b.exchange.clear_peer_strategy(&a.peer);
    assert_eq!(b.exchange.has_block(data.clone()).await.unwrap(), 1);
    assert_eq!(resolve(handle).await.unwrap(), data);
    assert_eq!(b.wants_from(&a.peer), 0);
}

#[tokio::test]
async fn test_has_block_serves_shared_want() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let data = block("arrives later");

    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());
    let b = node(&hub, &routing, 2, vec![], ExchangeArgs::default());
    routing.add_provider(data.key().clone(), b.peer);

    let first = a.exchange.want_block(data.key().clone()).unwrap();
    let second = a.exchange.want_block(data.key().clone()).unwrap();
    assert_eq!(a.exchange.wantlist(), vec![data.key().clone()]);

    eventually(|| b.wants_from(&a.peer) == 1).await;
    assert_eq!(a.network.sent_to(&b.peer).len(), 1);

    assert_eq!(b.exchange.has_block(data.clone()).await.unwrap(), 1);
    assert_eq!(resolve(first).await.unwrap(), data);
    assert_eq!(resolve(second).await.unwrap(), data);
    assert_eq!(b.store.len(), 1);
}

#[tokio::test]
async fn test_received_block_is_forwarded_to_wanting_partner() {
    let hub = MemoryHub::new();
    let data = block("pass it on");

    // c asks a, a asks b.
    let to_b = Arc::new(MockRouting::new());
    to_b.add_provider(data.key().clone(), peer_id(2));
    let to_a = Arc::new(MockRouting::new());
    to_a.add_provider(data.key().clone(), peer_id(1));

    let a = node(&hub, &to_b, 1, vec![], ExchangeArgs::default());
    let b = node(&hub, &to_b, 2, vec![data.clone()], ExchangeArgs::default());
    let c = node(&hub, &to_a, 3, vec![], ExchangeArgs::default());

    let waiting = c.exchange.want_block(data.key().clone()).unwrap();
    eventually(|| a.wants_from(&c.peer) == 1).await;

    let got = resolve(a.exchange.want_block(data.key().clone()).unwrap())
        .await
        .unwrap();
    assert_eq!(got, data);
    assert_eq!(resolve(waiting).await.unwrap(), data);
    assert_eq!(c.bytes_recv(&a.peer), data.len() as u64);
    assert_eq!(a.bytes_recv(&b.peer), data.len() as u64);
}

#[tokio::test]
async fn test_store_hit_skips_network() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let data = block("already here");
    let a = node(&hub, &routing, 1, vec![data.clone()], ExchangeArgs::default());

    let got = a.exchange.want_block(data.key().clone()).unwrap().await.unwrap();
    assert_eq!(got, data);
    assert!(routing.queries().is_empty());
    assert!(a.exchange.want_state(data.key()).is_none());
}

#[tokio::test]
async fn test_cancel_want() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let key = BlockKey::for_data(b"changed my mind");
    routing.stall(key.clone());
    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());

    let handle = a.exchange.want_block(key.clone()).unwrap();
    assert!(a.exchange.cancel_want(&key));
    assert!(!a.exchange.cancel_want(&key));

    assert_matches!(resolve(handle).await, Err(ExchangeError::Cancelled { .. }));
    assert_eq!(a.exchange.want_state(&key), Some(WantState::Cancelled));

    // A late block for a cancelled want is not accounted.
    let late = Block::with_key(key.clone(), &b"changed my mind"[..]);
    a.exchange
        .receive_message(peer_id(2), Message::block(1, late))
        .await
        .unwrap();
    assert_eq!(a.bytes_recv(&peer_id(2)), 0);
}

#[tokio::test]
async fn test_dropping_every_handle_cancels() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let key = BlockKey::for_data(b"abandoned");
    routing.stall(key.clone());
    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());

    let first = a.exchange.want_block(key.clone()).unwrap();
    let second = a.exchange.want_block(key.clone()).unwrap();

    drop(first);
    assert_eq!(a.exchange.want_state(&key), Some(WantState::Unsent));

    drop(second);
    assert_eq!(a.exchange.want_state(&key), Some(WantState::Cancelled));
    assert!(a.exchange.wantlist().is_empty());
}

#[tokio::test]
async fn test_shutdown_fails_waiters() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let key = BlockKey::for_data(b"too late");
    routing.stall(key.clone());
    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());

    let handle = a.exchange.want_block(key.clone()).unwrap();
    a.exchange.shutdown();

    assert_matches!(resolve(handle).await, Err(ExchangeError::Shutdown));
    assert!(a.exchange.is_shutdown());
    assert_matches!(a.exchange.want_block(key.clone()), Err(ExchangeError::Shutdown));
    assert_matches!(
        a.exchange
            .receive_message(peer_id(2), Message::want_block(1, key, vec![]))
            .await,
        Err(ExchangeError::Shutdown)
    );
}

#[tokio::test]
async fn test_invalid_block_is_rejected() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let key = BlockKey::for_data(b"expected");
    routing.stall(key.clone());
    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());
    let _handle = a.exchange.want_block(key.clone()).unwrap();

    let forged = Block::with_key(key.clone(), &b"forged"[..]);
    let result = a
        .exchange
        .receive_message(peer_id(2), Message::block(1, forged))
        .await;
    assert_matches!(result, Err(ExchangeError::InvalidBlock { .. }));

    assert_eq!(a.exchange.want_state(&key), Some(WantState::Unsent));
    assert!(a.exchange.ledger_snapshot(&peer_id(2)).is_none());
}

#[tokio::test]
async fn test_direct_get_block() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let data = block("direct");
    let missing = BlockKey::for_data(b"missing");

    let a = node(&hub, &routing, 1, vec![], ExchangeArgs::default());
    let b = node(&hub, &routing, 2, vec![data.clone()], ExchangeArgs::default());

    b.exchange
        .receive_message(a.peer, Message::get_block(7, data.key().clone()))
        .await
        .unwrap();
    b.exchange
        .receive_message(a.peer, Message::get_block(8, missing.clone()))
        .await
        .unwrap();

    let replies = b.network.sent_to(&a.peer);
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].id(), 7);
    assert_eq!(replies[0].delivered_block(), Some(data.clone()));
    assert_eq!(replies[1].id(), 8);
    assert_eq!(replies[1].success(), Some(false));
    assert!(replies[1].is_response());

    // The unsolicited delivery is dropped on a's side, and the not-found
    // reply is not taken as a request.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(a.store.is_empty());
    assert_eq!(a.bytes_recv(&b.peer), 0);
    assert_eq!(a.wants_from(&b.peer), 0);
    assert!(a.network.sent().is_empty());
}

#[tokio::test]
async fn test_malformed_proto_is_rejected() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let data = block("wire");
    let a = node(&hub, &routing, 1, vec![data.clone()], ExchangeArgs::default());
    let b = node(&hub, &routing, 2, vec![], ExchangeArgs::default());

    let result = a.exchange.receive_proto(b.peer, proto::Message::default()).await;
    assert_matches!(result, Err(ExchangeError::Malformed(_)));
    assert!(a.exchange.ledger_snapshot(&b.peer).is_none());

    let valid = proto::Message::from(Message::want_block(3, data.key().clone(), vec![]));
    a.exchange.receive_proto(b.peer, valid).await.unwrap();
    assert_eq!(a.network.sent_to(&b.peer).len(), 1);
}

#[tokio::test]
async fn test_fanout_grows_after_batch_of_hits() {
    let hub = MemoryHub::new();
    let routing = Arc::new(MockRouting::new());
    let blocks: Vec<_> = ["one", "two"].into_iter().map(block).collect();
    let args = ExchangeArgs {
        observation_batch: 2,
        ..Default::default()
    };

    let a = node(&hub, &routing, 1, vec![], args);
    let b = node(&hub, &routing, 2, blocks.clone(), ExchangeArgs::default());
    for data in &blocks {
        routing.add_provider(data.key().clone(), b.peer);
    }

    assert_eq!(a.exchange.fanout(), 1);
    for data in &blocks {
        resolve(a.exchange.want_block(data.key().clone()).unwrap())
            .await
            .unwrap();
    }
    // Both wants were answered by the first provider asked.
    assert_eq!(a.exchange.fanout(), 3);

    let summary = a.exchange.tracker().summary();
    assert_eq!(summary.entries, 2);
    assert_eq!(summary.effective, 2);
}

#[tokio::test]
async fn test_swarm_network_sends_over_dialed_connection() {
    let local = peer_id(1);
    let remote = peer_id(2);
    let addr = memory_addr(2);

    let book = Arc::new(MemoryPeerBook::new());
    book.add_address(remote, addr.clone());
    let transport = Arc::new(MockTransport::new());
    transport.set(addr, DialBehaviour::Accept(remote));

    let swarm = Swarm::new(local, Arc::clone(&transport), book, DialArgs::default());
    let network = SwarmNetwork::new(Arc::new(swarm));
    assert_eq!(network.local_peer(), local);

    let message = Message::want_block(1, BlockKey::for_data(b"x"), vec![]);
    network.connect(remote).await.unwrap();
    network.send_message(remote, message.clone()).await.unwrap();

    // One dial, reused for the send.
    assert_eq!(transport.dial_count(), 1);
    let conns = transport.connections();
    assert_eq!(conns.len(), 1);
    assert_eq!(conns[0].sent(), vec![message]);

    assert_matches!(
        network.connect(local).await,
        Err(NetworkError::Dial(DialError::SelfDialRejected { .. }))
    );
}
