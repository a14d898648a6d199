use serde::Deserialize;

/// Number of active IPv4 prefixes above which a peer is considered to carry a
/// full IPv4 table.
pub const DEFAULT_IPV4_FULLFEED_THRESHOLD: u32 = 400_000;

/// Number of active IPv6 prefixes above which a peer is considered to carry a
/// full IPv6 table.
pub const DEFAULT_IPV6_FULLFEED_THRESHOLD: u32 = 10_000;

pub const DEFAULT_METRIC_PREFIX: &str = "bgp";

/// Updates timestamped up to this many seconds before a RIB dump started are
/// presumed to have been sitting in the collector's backlog queue when the
/// dump was taken, and win over the RIB rows at reconciliation time.
pub const DEFAULT_BACKLOG_WINDOW_SECS: u32 = 60;

/// A peer absent from a RIB that has been silent for longer than this (in
/// BGP record time) is demoted to Unknown.
pub const DEFAULT_INACTIVE_TIMEOUT_SECS: u32 = 3600;

/// Engine configuration.
///
/// All fields have defaults; deserialization accepts partial documents.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    pub v4_fullfeed_threshold: u32,
    pub v6_fullfeed_threshold: u32,
    pub metric_prefix: String,
    pub metrics_enabled: bool,
    /// When set, full-feed thresholds are treated as 0 so every peer is
    /// published.
    pub publish_partial_feeds: bool,
    pub backlog_window_secs: u32,
    pub inactive_timeout_secs: u32,
    /// Whether the view of a partially-elapsed interval is still published
    /// when the engine is asked to shut down.
    pub publish_on_shutdown: bool,
}

impl Default for TablesConfig {
    fn default() -> Self {
        TablesConfig {
            v4_fullfeed_threshold: DEFAULT_IPV4_FULLFEED_THRESHOLD,
            v6_fullfeed_threshold: DEFAULT_IPV6_FULLFEED_THRESHOLD,
            metric_prefix: DEFAULT_METRIC_PREFIX.to_string(),
            metrics_enabled: true,
            publish_partial_feeds: false,
            backlog_window_secs: DEFAULT_BACKLOG_WINDOW_SECS,
            inactive_timeout_secs: DEFAULT_INACTIVE_TIMEOUT_SECS,
            publish_on_shutdown: true,
        }
    }
}

impl TablesConfig {
    /// Effective thresholds used by the full-feed predicate.
    pub fn effective_thresholds(&self) -> (u32, u32) {
        if self.publish_partial_feeds {
            (0, 0)
        } else {
            (self.v4_fullfeed_threshold, self.v6_fullfeed_threshold)
        }
    }
}
