use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex};
use std::task::Poll;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::Error;

/// Bound that peer addresses must satisfy to be used as map keys.
pub trait PeerAddr: Clone + Eq + Hash + Send + Sync + 'static {}
impl<T: Clone + Eq + Hash + Send + Sync + 'static> PeerAddr for T {}

struct PeerState {
    incoming_tx: mpsc::Sender<Bytes>,
    incoming_rx: AsyncMutex<mpsc::Receiver<Bytes>>,
    outgoing_tx: mpsc::Sender<Bytes>,
    outgoing_rx: AsyncMutex<mpsc::Receiver<Bytes>>,
    stash: StdMutex<Option<Bytes>>,
    last_touch: StdMutex<Instant>,
}

impl PeerState {
    fn new(capacity: usize) -> Self {
        let (incoming_tx, incoming_rx) = mpsc::channel(capacity);
        let (outgoing_tx, outgoing_rx) = mpsc::channel(capacity);
        Self {
            incoming_tx,
            incoming_rx: AsyncMutex::new(incoming_rx),
            outgoing_tx,
            outgoing_rx: AsyncMutex::new(outgoing_rx),
            stash: StdMutex::new(None),
            last_touch: StdMutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last_touch.lock().unwrap() = Instant::now();
    }
}

struct Inner<P: PeerAddr> {
    local_addr: P,
    config: Config,
    peers: StdMutex<HashMap<P, Arc<PeerState>>>,
    arrivals_tx: mpsc::UnboundedSender<P>,
    arrivals_rx: AsyncMutex<mpsc::UnboundedReceiver<P>>,
    cancellation: CancellationToken,
}

/// Demultiplexes packets per peer address, exposing a connectionless,
/// lossy packet interface: bounded per-peer incoming/outgoing queues, a
/// one-slot stash used by the bundling discipline, and (optionally) a
/// per-peer idle expiry.
///
/// Cheap to clone; clones share the same underlying state.
pub struct QueuePacketConn<P: PeerAddr>(Arc<Inner<P>>);

impl<P: PeerAddr> Clone for QueuePacketConn<P> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<P: PeerAddr + std::fmt::Debug> QueuePacketConn<P> {
    /// Creates a new connection with the given local address. Must be
    /// called from within a running Tokio runtime: when `config` enables
    /// an idle timeout, a background sweeper task is spawned to garbage
    /// collect expired peers.
    pub fn new(local_addr: P, config: Config) -> Self {
        let (arrivals_tx, arrivals_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            local_addr,
            config,
            peers: StdMutex::new(HashMap::new()),
            arrivals_tx,
            arrivals_rx: AsyncMutex::new(arrivals_rx),
            cancellation: CancellationToken::new(),
        });
        if let Some(idle_timeout) = inner.config.idle_timeout {
            tokio::spawn(sweep_loop(Arc::downgrade(&inner), idle_timeout));
        }
        Self(inner)
    }

    pub fn local_addr(&self) -> P {
        self.0.local_addr.clone()
    }

    /// Number of peers currently tracked. Exposed for idle-expiry tests.
    pub fn peer_count(&self) -> usize {
        self.0.peers.lock().unwrap().len()
    }

    fn get_or_create_peer(&self, peer: &P) -> Arc<PeerState> {
        let mut peers = self.0.peers.lock().unwrap();
        if let Some(state) = peers.get(peer) {
            return state.clone();
        }
        let state = Arc::new(PeerState::new(self.0.config.queue_capacity));
        peers.insert(peer.clone(), state.clone());
        state
    }

    /// Enqueues `packet` on `peer`'s outgoing queue. Drops silently if
    /// the queue is full. Fails with [`Error::Closed`] if the connection
    /// has been closed.
    pub fn send_to(&self, peer: P, packet: Bytes) -> Result<(), Error> {
        if self.0.cancellation.is_cancelled() {
            return Err(Error::Closed);
        }
        let state = self.get_or_create_peer(&peer);
        if state.outgoing_tx.try_send(packet).is_err() {
            trace!(?peer, "outgoing queue full, dropping packet");
        }
        Ok(())
    }

    /// Enqueues `packet` on `peer`'s incoming queue, to later be
    /// returned from [`Self::recv_from`]. Drops silently if the queue is
    /// full or the connection is closed.
    pub fn queue_incoming(&self, peer: P, packet: Bytes) {
        if self.0.cancellation.is_cancelled() {
            return;
        }
        let state = self.get_or_create_peer(&peer);
        state.touch();
        if state.incoming_tx.try_send(packet).is_ok() {
            let _ = self.0.arrivals_tx.send(peer);
        } else {
            trace!(?peer, "incoming queue full, dropping packet");
        }
    }

    /// Blocks until some peer's incoming queue yields a packet, or
    /// returns [`Error::Closed`] once the connection is closed.
    pub async fn recv_from(&self) -> Result<(Bytes, P), Error> {
        loop {
            tokio::select! {
                biased;
                _ = self.0.cancellation.cancelled() => return Err(Error::Closed),
                arrived = async { self.0.arrivals_rx.lock().await.recv().await } => {
                    let Some(peer) = arrived else { return Err(Error::Closed) };
                    let state = self.get_or_create_peer(&peer);
                    let mut rx = state.incoming_rx.lock().await;
                    if let Ok(packet) = rx.try_recv() {
                        return Ok((packet, peer));
                    }
                    // Already drained by a racing RecvFrom, or the peer was
                    // garbage collected between the notification and now.
                }
            }
        }
    }

    /// Put-if-empty: stashes `packet` for `peer` unless one is already
    /// stashed and not yet consumed, in which case `packet` is dropped.
    pub fn stash(&self, peer: P, packet: Bytes) {
        if self.0.cancellation.is_cancelled() {
            return;
        }
        let state = self.get_or_create_peer(&peer);
        let mut slot = state.stash.lock().unwrap();
        if slot.is_none() {
            *slot = Some(packet);
        } else {
            trace!(?peer, "stash already occupied, dropping packet");
        }
    }

    /// Resolves with the stashed packet for `peer` as soon as one is
    /// present; otherwise never resolves. Intended for use as the
    /// highest-priority branch of a `tokio::select!`.
    pub async fn unstash(&self, peer: &P) -> Bytes {
        let state = self.get_or_create_peer(peer);
        std::future::poll_fn(move |_cx| match state.stash.lock().unwrap().take() {
            Some(packet) => Poll::Ready(packet),
            None => Poll::Pending,
        })
        .await
    }

    /// Non-blocking take from `peer`'s stash.
    pub fn try_unstash(&self, peer: &P) -> Option<Bytes> {
        let state = self.get_or_create_peer(peer);
        state.stash.lock().unwrap().take()
    }

    /// Blocks until `peer`'s outgoing queue yields a packet, or never
    /// resolves if the peer's state has been torn down (e.g. idle GC).
    pub async fn next_outgoing(&self, peer: &P) -> Option<Bytes> {
        let state = self.get_or_create_peer(peer);
        let mut rx = state.outgoing_rx.lock().await;
        rx.recv().await
    }

    /// Non-blocking pull from `peer`'s outgoing queue.
    pub fn try_next_outgoing(&self, peer: &P) -> Option<Bytes> {
        let state = self.get_or_create_peer(peer);
        let mut rx = state.outgoing_rx.try_lock().ok()?;
        rx.try_recv().ok()
    }

    /// Transitions to closed: wakes all blocked `recv_from` callers with
    /// `closed-connection`, and causes subsequent `send_to`/
    /// `queue_incoming` to fail or drop. Idempotent.
    pub fn close(&self) {
        if self.0.cancellation.is_cancelled() {
            return;
        }
        debug!(local_addr = ?self.0.local_addr, "closing queue packet conn");
        self.0.cancellation.cancel();
        self.0.peers.lock().unwrap().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.0.cancellation.is_cancelled()
    }
}

async fn sweep_loop<P: PeerAddr>(inner: std::sync::Weak<Inner<P>>, idle_timeout: Duration) {
    let period = (idle_timeout / 4).max(Duration::from_millis(10));
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(inner) = inner.upgrade() else { return };
        if inner.cancellation.is_cancelled() {
            return;
        }
        let now = Instant::now();
        let mut peers = inner.peers.lock().unwrap();
        let before = peers.len();
        peers.retain(|_, state| now.duration_since(*state.last_touch.lock().unwrap()) <= idle_timeout);
        let removed = before - peers.len();
        if removed > 0 {
            debug!(removed, "idle peer expiry swept stale peers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config {
            queue_capacity: 4,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn lossy_outgoing_queue_drops_past_capacity() {
        let conn = QueuePacketConn::new("peer", cfg());
        for i in 0..4u8 {
            conn.send_to("peer", Bytes::from(vec![i])).unwrap();
        }
        // Queue is full now; this one is dropped silently, not an error.
        conn.send_to("peer", Bytes::from_static(b"dropped")).unwrap();
        for i in 0..4u8 {
            assert_eq!(conn.try_next_outgoing(&"peer").unwrap(), Bytes::from(vec![i]));
        }
        assert!(conn.try_next_outgoing(&"peer").is_none());
    }

    #[tokio::test]
    async fn stash_precedence_over_outgoing_queue() {
        let conn = QueuePacketConn::new("peer", cfg());
        conn.send_to("peer", Bytes::from_static(b"queued")).unwrap();
        conn.stash("peer", Bytes::from_static(b"stashed"));

        let stashed = conn.unstash(&"peer").await;
        assert_eq!(stashed, Bytes::from_static(b"stashed"));
        let queued = conn.try_next_outgoing(&"peer").unwrap();
        assert_eq!(queued, Bytes::from_static(b"queued"));
    }

    #[tokio::test]
    async fn stash_drops_second_write_until_consumed() {
        let conn = QueuePacketConn::new("peer", cfg());
        conn.stash("peer", Bytes::from_static(b"first"));
        conn.stash("peer", Bytes::from_static(b"second"));
        assert_eq!(conn.unstash(&"peer").await, Bytes::from_static(b"first"));
    }

    #[tokio::test]
    async fn try_unstash_is_non_blocking() {
        let conn = QueuePacketConn::new("peer", cfg());
        assert!(conn.try_unstash(&"peer").is_none());
        conn.stash("peer", Bytes::from_static(b"stashed"));
        assert_eq!(conn.try_unstash(&"peer").unwrap(), Bytes::from_static(b"stashed"));
        assert!(conn.try_unstash(&"peer").is_none());
    }

    #[tokio::test]
    async fn recv_from_delivers_queued_incoming_packets() {
        let conn = QueuePacketConn::new("local", cfg());
        conn.queue_incoming("remote", Bytes::from_static(b"hi"));
        let (packet, peer) = conn.recv_from().await.unwrap();
        assert_eq!(packet, Bytes::from_static(b"hi"));
        assert_eq!(peer, "remote");
    }

    #[tokio::test]
    async fn close_wakes_blocked_recv_from() {
        let conn = QueuePacketConn::new("local", cfg());
        let conn2 = conn.clone();
        let task = tokio::spawn(async move { conn2.recv_from().await });
        tokio::task::yield_now().await;
        conn.close();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("recv_from did not wake up after close")
            .unwrap();
        assert!(matches!(result, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn send_to_after_close_is_an_error() {
        let conn = QueuePacketConn::new("local", cfg());
        conn.close();
        assert!(matches!(conn.send_to("peer", Bytes::new()), Err(Error::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_peers_are_garbage_collected() {
        let conn = QueuePacketConn::new(
            "local",
            Config {
                idle_timeout: Some(Duration::from_millis(100)),
                ..cfg()
            },
        );
        conn.queue_incoming("remote", Bytes::from_static(b"hi"));
        assert_eq!(conn.peer_count(), 1);
        tokio::time::advance(Duration::from_millis(250)).await;
        // Give the sweeper a couple of its own ticks to run.
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(conn.peer_count(), 0, "idle peer should have been swept");
    }
}
