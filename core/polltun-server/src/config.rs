use std::time::Duration;

/// Tunable constants for the HTTP request handler and listener, layered
/// on top of the per-peer [`polltun_core::Config`] that governs the
/// shared [`polltun_core::QueuePacketConn`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Per-peer queue capacities, bundle cap, and idle timeout.
    pub queue: polltun_core::Config,
    /// Upper bound on how long a response POST is held open waiting for
    /// the first outgoing packet.
    pub turnaround_timeout: Duration,
    /// Soft cap, in bytes, on the framed records of a single response
    /// body.
    pub max_payload_length: usize,
    /// Request bodies larger than this are truncated; ingest stops but
    /// the handler still responds normally.
    pub max_request_length: usize,
    /// Idle read/write timeout applied to each connection.
    pub io_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue: polltun_core::Config::server(),
            turnaround_timeout: Duration::from_millis(100),
            max_payload_length: 0x10000,
            max_request_length: 0x10001,
            io_timeout: Duration::from_secs(20),
        }
    }
}
