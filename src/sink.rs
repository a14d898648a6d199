/*!
Delivery boundaries: where completed views and metric series leave the
engine.

Both sinks are deliberately small traits. Delivery is best-effort: a failing
view sink is logged as a warning by the interval driver and the engine keeps
folding records.
*/

use crate::error::SinkError;
use crate::models::*;
use crate::registry::PeerRegistry;
use crate::view::View;
use std::io::Write;

/// Predicate deciding which peers a published view should include.
pub type PeerFilter<'a> = &'a dyn Fn(&View, PeerId) -> bool;

/// The full-feed predicate: a peer is included iff its active IPv4 prefix
/// count reaches the configured IPv4 threshold or its active IPv6 count
/// reaches the IPv6 threshold.
pub fn full_feed_filter(view: &View, peer_id: PeerId) -> bool {
    let config = view.config();
    match view.peer(peer_id) {
        Some(peer) => {
            peer.active_pfx_cnt(AddrFamily::Ipv4) >= config.v4_fullfeed_threshold
                || peer.active_pfx_cnt(AddrFamily::Ipv6) >= config.v6_fullfeed_threshold
        }
        None => false,
    }
}

/// Consumer of completed views.
pub trait ViewSink {
    /// Hand over one completed view. The sink may observe peers (with their
    /// signatures) and cells but does not mutate the view.
    fn send_view(
        &mut self,
        view: &View,
        registry: &PeerRegistry,
        filter: PeerFilter<'_>,
    ) -> Result<(), SinkError>;
}

/// Consumer of named scalar time series.
pub trait MetricsSink {
    fn push(&mut self, key: &str, time: u32, value: u64);
}

/// Writes each accepted (prefix, peer) cell of a view as one JSON object per
/// line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ViewSink for JsonLinesSink<W> {
    fn send_view(
        &mut self,
        view: &View,
        registry: &PeerRegistry,
        filter: PeerFilter<'_>,
    ) -> Result<(), SinkError> {
        for row in view.export_rows(registry) {
            if !filter(view, row.peer_id) {
                continue;
            }
            serde_json::to_writer(&mut self.writer, &row)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Emits metric points through the logging facade, one `info!` line each.
/// Handy for debugging and as a stand-in where no real time-series backend
/// is wired up.
#[derive(Debug, Default)]
pub struct LogMetricsSink;

impl MetricsSink for LogMetricsSink {
    fn push(&mut self, key: &str, time: u32, value: u64) {
        log::info!("{} {} {}", key, value, time);
    }
}
