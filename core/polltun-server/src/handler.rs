//! The request/response contract of §4.4: two methods, silent absorption
//! of non-conforming bodies, and a turnaround-bounded response-bundling
//! loop. No branch of [`handle`] returns an HTTP error status for a
//! malformed or oversized body — that is a deliberate traffic-analysis
//! property, not an oversight.

use bytes::{Bytes, BytesMut};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use polltun_core::{ClientId, QueuePacketConn, CLIENT_ID_LEN};
use tracing::{instrument, trace, warn};

use crate::config::Config;

const DIAGNOSTIC_BODY: &str = "I'm just a happy little web server.\n";

pub type ResponseBody = Full<Bytes>;

/// Handles a single request against the shared `QueuePacketConn`, keyed
/// by the ClientID carried in POST bodies.
#[instrument(skip_all, fields(method = %req.method(), path = req.uri().path()))]
pub async fn handle<B>(req: Request<B>, queue: &QueuePacketConn<ClientId>, config: &Config) -> Response<ResponseBody>
where
    B: http_body::Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    match *req.method() {
        Method::GET if req.uri().path() == "/" => diagnostic_response(),
        Method::GET => status_only(StatusCode::NOT_FOUND),
        Method::POST => handle_post(req, queue, config).await,
        _ => status_only(StatusCode::BAD_REQUEST),
    }
}

fn diagnostic_response() -> Response<ResponseBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from_static(DIAGNOSTIC_BODY.as_bytes())))
        .expect("static response is well-formed")
}

fn status_only(status: StatusCode) -> Response<ResponseBody> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .expect("status-only response is well-formed")
}

fn empty_ok() -> Response<ResponseBody> {
    Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/octet-stream")
        .body(Full::new(Bytes::new()))
        .expect("empty response is well-formed")
}

async fn handle_post<B>(req: Request<B>, queue: &QueuePacketConn<ClientId>, config: &Config) -> Response<ResponseBody>
where
    B: http_body::Body<Data = Bytes> + Unpin,
    B::Error: std::fmt::Display,
{
    let body = match read_capped(req.into_body(), config.max_request_length).await {
        Ok(body) => body,
        Err(err) => {
            trace!(%err, "error reading request body, absorbing silently");
            return empty_ok();
        }
    };

    // A short read (including the degenerate zero-byte body a bare probe
    // sends) terminates the request without touching any per-peer state.
    if body.len() < CLIENT_ID_LEN {
        trace!(len = body.len(), "short request body, absorbing silently");
        return empty_ok();
    }

    let (id_bytes, rest) = body.split_at(CLIENT_ID_LEN);
    let client_id = ClientId::try_from(id_bytes).expect("split_at guarantees exactly CLIENT_ID_LEN bytes");

    let mut ingested = 0usize;
    for record in encap_codec::FrameReader::new(Bytes::copy_from_slice(rest)) {
        match record {
            Ok(packet) => {
                queue.queue_incoming(client_id, packet);
                ingested += 1;
            }
            Err(err) => {
                warn!(%err, "malformed request frame, discarding remainder of this request's body");
                break;
            }
        }
    }
    trace!(%client_id, ingested, "ingested packets from request body");

    let response_body = assemble_response_body(queue, client_id, config).await;
    Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/octet-stream")
        .body(Full::new(response_body.freeze()))
        .expect("response built from a bounded body is always well-formed")
}

/// Reads `body` into memory, stopping (without erroring) once `cap`
/// bytes have been collected. Exceeding the cap is not reported back to
/// the caller as a read failure: the handler still responds normally on
/// whatever prefix was ingested, matching the reference's
/// read-fails-and-handler-returns behavior without surfacing an error
/// status for it.
async fn read_capped<B>(mut body: B, cap: usize) -> Result<BytesMut, B::Error>
where
    B: http_body::Body<Data = Bytes> + Unpin,
{
    let mut buf = BytesMut::new();
    while buf.len() < cap {
        let Some(frame) = body.frame().await else { break };
        if let Ok(data) = frame?.into_data() {
            buf.extend_from_slice(&data);
        }
    }
    if buf.len() > cap {
        buf.truncate(cap);
    }
    Ok(buf)
}

/// The response-bundling loop: a single-shot turnaround timer races the
/// per-ClientID stash and outgoing queue for the first packet, then
/// greedily and non-blockingly drains further packets under the payload
/// budget, stashing the first one that overflows it. Identical priority
/// discipline to the client's request loop (stash, then outgoing queue,
/// then timer).
async fn assemble_response_body(queue: &QueuePacketConn<ClientId>, client_id: ClientId, config: &Config) -> BytesMut {
    let mut body = BytesMut::new();
    let mut first = true;
    loop {
        let packet = if first {
            let sleep = tokio::time::sleep(config.turnaround_timeout);
            tokio::pin!(sleep);
            tokio::select! {
                biased;
                p = queue.unstash(&client_id) => Some(p),
                p = queue.next_outgoing(&client_id) => p,
                _ = &mut sleep => None,
            }
        } else {
            queue.try_unstash(&client_id).or_else(|| queue.try_next_outgoing(&client_id))
        };

        let Some(packet) = packet else { break };

        if !first && body.len() + packet.len() + 3 > config.max_payload_length {
            queue.stash(client_id, packet);
            break;
        }

        if let Err(err) = encap_codec::encode_data(&mut body, &packet) {
            warn!(%err, "dropping response packet that cannot be encapsulated");
        }
        first = false;
    }
    body
}
