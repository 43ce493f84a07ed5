//! Node configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Default maximum number of contacts per k-bucket, and the maximum length
/// of any nearest-contacts result.
pub const DEFAULT_K: usize = 20;

/// Default degree of parallelism in outbound lookup rounds.
pub const DEFAULT_ALPHA: usize = 3;

/// Default request timeout before abandoning a remote call to a
/// non-responding contact.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone)]
/// Node configurations, injected at [crate::Node::bind].
pub struct Config {
    /// Maximum contacts per bucket and per nearest-contacts result.
    ///
    /// Defaults to [DEFAULT_K]
    pub k: usize,
    /// Maximum number of concurrent remote calls per lookup round.
    ///
    /// Defaults to [DEFAULT_ALPHA]
    pub alpha: usize,
    /// Address to bind the UDP socket to.
    ///
    /// Defaults to `0.0.0.0:0` (ephemeral port).
    pub bind_addr: SocketAddr,
    /// Canonical endpoint this node is reachable at, hashed into the node's
    /// identifier. When `None` the bound socket address is used.
    pub public_addr: Option<SocketAddr>,
    /// Remote call timeout.
    ///
    /// The longer this duration is, the longer lookup rounds may block on an
    /// unresponsive contact. The shorter it is, the more replies from busy
    /// contacts are missed, which affects the accuracy of lookups.
    ///
    /// Defaults to [DEFAULT_REQUEST_TIMEOUT]
    pub request_timeout: Duration,
    /// Cache a found value at the closest queried contact that missed it.
    ///
    /// Defaults to `true`
    pub cache_on_lookup: bool,
    /// Time after which a key/value pair expires (TTL from original
    /// publication date).
    pub expire_after: Duration,
    /// Time after which an unaccessed bucket must be refreshed.
    pub refresh_interval: Duration,
    /// Interval between replication events, when a node is required to
    /// publish its entire database.
    pub replicate_interval: Duration,
    /// Time after which the original publisher must republish a key/value
    /// pair.
    pub republish_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            alpha: DEFAULT_ALPHA,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            public_addr: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cache_on_lookup: true,
            expire_after: Duration::from_secs(864_000),
            refresh_interval: Duration::from_secs(3_600),
            replicate_interval: Duration::from_secs(3_600),
            republish_interval: Duration::from_secs(86_400),
        }
    }
}
