use std::sync::Arc;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::client_id::ClientId;
use crate::config::Config;
use crate::poller::Poller;
use crate::queue::{PeerAddr, QueuePacketConn};

/// Drives the client side of the transport: exposes a connectionless
/// packet interface (`send_to`/`recv_from`) over a carrier that only
/// supports request/response polling, via an injected [`Poller`].
///
/// Owns a private [`QueuePacketConn`] with exactly one peer, the
/// configured remote address, and a background request-loop task that
/// runs for the lifetime of the connection.
pub struct PollingPacketConn<P: PeerAddr + std::fmt::Debug, A: Poller> {
    client_id: ClientId,
    remote_addr: P,
    queue: QueuePacketConn<P>,
    cancellation: CancellationToken,
    request_loop: JoinHandle<()>,
    _poller: std::marker::PhantomData<A>,
}

impl<P: PeerAddr + std::fmt::Debug, A: Poller> PollingPacketConn<P, A> {
    /// Creates a connection and spawns its request loop. Must be called
    /// from within a running Tokio runtime.
    pub fn new(remote_addr: P, poller: A, config: Config) -> Self {
        let client_id = ClientId::generate();
        let queue = QueuePacketConn::new(remote_addr.clone(), config.clone());
        let cancellation = CancellationToken::new();
        let poller = Arc::new(poller);
        let poll_semaphore = Arc::new(Semaphore::new(config.poll_concurrency.max(1)));

        let request_loop = tokio::spawn(request_loop(
            client_id,
            remote_addr.clone(),
            queue.clone(),
            poller,
            poll_semaphore,
            cancellation.clone(),
            config,
        ));

        Self {
            client_id,
            remote_addr,
            queue,
            cancellation,
            request_loop,
            _poller: std::marker::PhantomData,
        }
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn remote_addr(&self) -> P {
        self.remote_addr.clone()
    }

    /// Enqueues `packet` for delivery on the next poll. Non-blocking;
    /// drops silently on a full outgoing queue.
    pub fn send_to(&self, packet: Bytes) -> Result<(), crate::error::Error> {
        self.queue.send_to(self.remote_addr.clone(), packet)
    }

    /// Blocks until a packet from the remote arrives, or the connection
    /// is closed.
    pub async fn recv_from(&self) -> Result<(Bytes, P), crate::error::Error> {
        self.queue.recv_from().await
    }

    /// Cancels any in-flight or future polls and closes the underlying
    /// queue. After this returns, no further `Poll` invocations will be
    /// issued. Idempotent.
    pub fn close(&self) {
        self.cancellation.cancel();
        self.queue.close();
    }
}

impl<P: PeerAddr + std::fmt::Debug, A: Poller> Drop for PollingPacketConn<P, A> {
    fn drop(&mut self) {
        self.close();
        self.request_loop.abort();
    }
}

/// Resolves with `peer`'s outgoing packet as soon as one is available;
/// if the peer's queue is torn down (only possible via idle GC, which
/// the client side never enables), never resolves — the loop's
/// cancellation branch is relied on to make progress in that case.
async fn await_outgoing<P: PeerAddr + std::fmt::Debug>(queue: QueuePacketConn<P>, peer: P) -> Bytes {
    match queue.next_outgoing(&peer).await {
        Some(packet) => packet,
        None => std::future::pending().await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn request_loop<P, A>(
    client_id: ClientId,
    remote_addr: P,
    queue: QueuePacketConn<P>,
    poller: Arc<A>,
    poll_semaphore: Arc<Semaphore>,
    cancellation: CancellationToken,
    config: Config,
) where
    P: PeerAddr + std::fmt::Debug,
    A: Poller,
{
    let mut poll_delay = config.initial_poll_delay;
    loop {
        let sleep = tokio::time::sleep(poll_delay);
        tokio::pin!(sleep);

        let (packet, timer_expired): (Bytes, bool) = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return,
            p = queue.unstash(&remote_addr) => (p, false),
            p = await_outgoing(queue.clone(), remote_addr.clone()) => (p, false),
            _ = &mut sleep => (Bytes::new(), true),
        };

        if cancellation.is_cancelled() {
            return;
        }

        poll_delay = if timer_expired {
            Duration::from_secs_f64((poll_delay.as_secs_f64() * config.poll_backoff_multiplier).min(config.max_poll_delay.as_secs_f64()))
        } else {
            config.initial_poll_delay
        };

        let body = assemble_bundle(&client_id, &queue, &remote_addr, packet, &config);

        let permit = match poll_semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let poller = poller.clone();
        let queue = queue.clone();
        let remote_addr = remote_addr.clone();
        let cancellation = cancellation.clone();
        tokio::spawn(async move {
            let _permit = permit;
            if cancellation.is_cancelled() {
                return;
            }
            poll_once(poller, queue, remote_addr, cancellation, body).await;
        });
    }
}

/// Greedily, non-blockingly drains further outgoing packets into `body`
/// (always including the packet the request loop was woken with),
/// stashing the first one that doesn't fit under the bundle cap.
fn assemble_bundle<P: PeerAddr + std::fmt::Debug>(
    client_id: &ClientId,
    queue: &QueuePacketConn<P>,
    remote_addr: &P,
    first_packet: Bytes,
    config: &Config,
) -> Bytes {
    let mut body = BytesMut::with_capacity(8 + first_packet.len());
    body.put_slice(client_id.as_bytes());

    let mut first = true;
    let mut next = Some(first_packet);
    while let Some(packet) = next {
        if first || body.len() + packet.len() <= config.bundle_cap {
            if let Err(err) = encap_codec::encode_data(&mut body, &packet) {
                warn!(%err, "dropping packet that cannot be encapsulated");
            }
            first = false;
            next = queue.try_next_outgoing(remote_addr);
        } else {
            queue.stash(remote_addr.clone(), packet);
            break;
        }
    }
    body.freeze()
}

#[instrument(skip_all)]
async fn poll_once<P, A>(poller: Arc<A>, queue: QueuePacketConn<P>, remote_addr: P, cancellation: CancellationToken, body: Bytes)
where
    P: PeerAddr + std::fmt::Debug,
    A: Poller,
{
    let mut response = match poller.poll(body, cancellation.clone()).await {
        Ok(response) => response,
        Err(err) => {
            debug!(%err, "poll failed, closing connection");
            cancellation.cancel();
            queue.close();
            return;
        }
    };

    let mut buf = Vec::new();
    if let Err(err) = response.read_to_end(&mut buf).await {
        debug!(%err, "error reading poll response, closing connection");
        cancellation.cancel();
        queue.close();
        return;
    }

    for record in encap_codec::FrameReader::new(Bytes::from(buf)) {
        if cancellation.is_cancelled() {
            return;
        }
        match record {
            Ok(packet) => queue.queue_incoming(remote_addr.clone(), packet),
            Err(err) => {
                warn!(%err, "malformed response frame, discarding remainder of this poll's body");
                return;
            }
        }
    }
}
