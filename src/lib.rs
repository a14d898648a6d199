/*!
`bgp-tables` maintains consistent, timestamped routing-table views from
streams of BGP observations.

Route collectors emit two kinds of data about each of their peers: periodic
full-table dumps (RIBs) and incremental update messages (announcements,
withdrawals, session state changes). This crate folds both into one shared
*view*, a mapping from every (peer, prefix) pair to the currently-believed
origin AS and liveness status, and publishes that view at regular
intervals.

The interesting part is that a RIB dump takes minutes to arrive and is
interleaved with updates whose timestamps straddle the dump window. The
engine therefore builds each new RIB *under construction* next to the live
state and reconciles the two at dump end: a RIB row wins over live data only
if it is newer and the live update does not fall in the backlog window just
before the dump started (those updates were queued at the collector when the
dump was taken, so they are fresher than the dump despite the smaller
timestamp).

# Example

Folding a handful of records by hand and inspecting the result:

```rust
use bgp_tables::models::*;
use bgp_tables::{RouteTables, TablesConfig};
use std::str::FromStr;

let mut tables = RouteTables::new(TablesConfig::default());

let record = BgpRecord {
    status: RecordStatus::Valid,
    dump_type: DumpType::Updates,
    dump_pos: DumpPosition::Middle,
    dump_time: 0,
    record_time: 1444341000,
    project: "ris".to_string(),
    collector: "rrc00".to_string(),
    elems: vec![BgpElem {
        elem_type: ElemType::STATE,
        peer_ip: std::net::IpAddr::from_str("192.0.2.1").unwrap(),
        peer_asn: Asn::new(65001),
        new_state: Some(FsmState::Established),
        ..BgpElem::default()
    }],
};
tables.process_record(&record).unwrap();

let collector = tables.collector("rrc00").unwrap();
assert_eq!(collector.valid_record_cnt, 1);
```

Continuous operation goes through [pipeline::Pipeline], which pulls records
from a [pipeline::RecordSource] on its own thread, closes an interval every
N seconds of BGP time, and hands completed views to a [sink::ViewSink]
together with the full-feed peer filter.

# Data representation

A view is a sparse peers × prefixes matrix over a longest-prefix-match
index ([patricia::PatriciaTree]). Peers are identified by a compact
[models::PeerId] allocated by the [registry::PeerRegistry] from the
`(collector, peer-ip, peer-asn)` signature. Each (prefix, peer) cell tracks
its live origin plus the under-construction origin of any in-progress dump;
three reserved-band sentinels ([models::Origin]) distinguish locally
originated prefixes, set/confederation origins, and withdrawn state from
real origin ASNs.
*/

pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod patricia;
pub mod pipeline;
pub mod registry;
pub mod sink;
pub mod view;

pub use config::TablesConfig;
pub use engine::{Collector, CollectorState, RouteTables};
pub use error::{SinkError, TablesError};
pub use models::{BgpElem, BgpRecord, Origin};
pub use registry::PeerRegistry;
pub use sink::{full_feed_filter, JsonLinesSink, LogMetricsSink, MetricsSink, ViewSink};
pub use view::{View, ViewState};
