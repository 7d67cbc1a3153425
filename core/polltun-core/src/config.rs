use std::time::Duration;

/// Tunable constants shared by [`crate::QueuePacketConn`] and
/// [`crate::PollingPacketConn`]. Defaults match the external interfaces
/// of the protocol this crate implements; tests override individual
/// fields rather than the production constants.
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of each peer's incoming and outgoing queue.
    pub queue_capacity: usize,
    /// Soft cap, in bytes, on a single bundled HTTP body.
    pub bundle_cap: usize,
    /// Per-peer idle expiry. `None` disables expiry (the client side,
    /// which has exactly one peer and no adversarial population to
    /// bound).
    pub idle_timeout: Option<Duration>,
    /// Poll delay floor; also the value the delay resets to whenever a
    /// packet is seen.
    pub initial_poll_delay: Duration,
    /// Poll delay ceiling.
    pub max_poll_delay: Duration,
    /// Geometric growth factor applied to the poll delay on each timer
    /// expiry that finds nothing to send.
    pub poll_backoff_multiplier: f64,
    /// Upper bound on concurrently in-flight `Poll` invocations.
    pub poll_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            bundle_cap: 0x10000,
            idle_timeout: None,
            initial_poll_delay: Duration::from_millis(500),
            max_poll_delay: Duration::from_secs(10),
            poll_backoff_multiplier: 2.0,
            poll_concurrency: 4,
        }
    }
}

impl Config {
    /// Convenience constructor for the client side: same as [`Default`].
    pub fn client() -> Self {
        Self::default()
    }

    /// Convenience constructor for the server side: adds the per-peer
    /// idle expiry that bounds memory under abandoned or adversarial
    /// ClientIDs.
    pub fn server() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(30 * 60)),
            ..Self::default()
        }
    }
}
