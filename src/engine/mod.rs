/*!
The routing-tables engine: folds records from any number of collectors into
one shared view, reconciles RIB dumps against the live state, and publishes
the view at interval boundaries.

The engine is a single value mutated by one thread; all concurrency lives at
the boundaries (see [crate::pipeline]).
*/

mod collector;
mod metrics;
mod rib;
mod updates;

pub use collector::{Collector, CollectorState};
pub use metrics::graphite_safe;

use crate::config::TablesConfig;
use crate::error::{SinkError, TablesError};
use crate::models::*;
use crate::registry::PeerRegistry;
use crate::sink::{full_feed_filter, MetricsSink, ViewSink};
use crate::view::{View, ViewConfig};
use chrono::Utc;
use collector::WALL_UPDATE_PERIOD;
use log::{info, warn};
use std::collections::HashMap;

fn wall_time_now() -> u32 {
    Utc::now().timestamp().max(0) as u32
}

/// Per-collector routing tables folded from a stream of BGP records.
pub struct RouteTables {
    config: TablesConfig,
    registry: PeerRegistry,
    view: View,
    collectors: HashMap<String, Collector>,
    bgp_time_interval_start: u32,
    wall_time_interval_start: u32,
    /// Set after an unrecoverable resource failure; all further records are
    /// refused.
    exhausted: bool,
}

impl RouteTables {
    pub fn new(config: TablesConfig) -> Self {
        let mut view = View::new();
        let (v4, v6) = config.effective_thresholds();
        view.set_config(ViewConfig {
            v4_fullfeed_threshold: v4,
            v6_fullfeed_threshold: v6,
        });
        RouteTables {
            config,
            registry: PeerRegistry::new(),
            view,
            collectors: HashMap::new(),
            bgp_time_interval_start: 0,
            wall_time_interval_start: 0,
            exhausted: false,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn config(&self) -> &TablesConfig {
        &self.config
    }

    pub fn collector(&self, name: &str) -> Option<&Collector> {
        self.collectors.get(name)
    }

    pub fn collectors(&self) -> impl Iterator<Item = &Collector> {
        self.collectors.values()
    }

    /// Adjust a full-feed threshold at runtime.
    pub fn set_fullfeed_threshold(&mut self, family: AddrFamily, threshold: u32) {
        match family {
            AddrFamily::Ipv4 => self.config.v4_fullfeed_threshold = threshold,
            AddrFamily::Ipv6 => self.config.v6_fullfeed_threshold = threshold,
        }
        let (v4, v6) = self.config.effective_thresholds();
        self.view.set_config(ViewConfig {
            v4_fullfeed_threshold: v4,
            v6_fullfeed_threshold: v6,
        });
    }

    /// Fold one record into the view. Records are processed in arrival
    /// order; all elements of a record are folded before this returns.
    pub fn process_record(&mut self, record: &BgpRecord) -> Result<(), TablesError> {
        if self.exhausted {
            return Err(TablesError::ResourceExhausted(
                "engine refuses records after resource exhaustion".to_string(),
            ));
        }

        let Self {
            config,
            registry,
            view,
            collectors,
            exhausted,
            ..
        } = self;

        let c = collectors.entry(record.collector.clone()).or_insert_with(|| {
            Collector::new(
                record.collector.clone(),
                metrics::collector_label(&record.project, &record.collector),
            )
        });

        // A record older than the authoritative window is useless while a new
        // RIB is being built against that window: drop it.
        if record.record_time < c.ref_rib_start_time && c.uc_rib_dump_time != 0 {
            return Ok(());
        }

        let result = match record.status {
            RecordStatus::Valid => {
                let result = Self::process_valid_record(config, registry, view, c, record);
                c.valid_record_cnt += 1;
                result
            }
            RecordStatus::CorruptedSource | RecordStatus::CorruptedRecord => {
                rib::process_corrupted_record(view, c, record.record_time);
                c.corrupted_record_cnt += 1;
                Ok(())
            }
            RecordStatus::FilteredSource | RecordStatus::EmptySource => {
                // no state change; bgp_time_last advances below
                c.empty_record_cnt += 1;
                Ok(())
            }
        };

        if matches!(result, Err(TablesError::ResourceExhausted(_))) {
            *exhausted = true;
        }

        Self::update_collector_state(view, c, record.record_time);
        result
    }

    fn process_valid_record(
        config: &TablesConfig,
        registry: &mut PeerRegistry,
        view: &mut View,
        c: &mut Collector,
        record: &BgpRecord,
    ) -> Result<(), TablesError> {
        if record.dump_type == DumpType::Rib {
            if record.dump_pos == DumpPosition::Start {
                // a dump start while another dump is open aborts the old one
                if c.uc_rib_dump_time != 0 {
                    rib::stop_uc(view, c);
                }
                c.uc_rib_dump_time = record.dump_time;
                c.uc_rib_start_time = record.record_time;
            }
            if record.dump_time != c.uc_rib_dump_time {
                // rows of a different dump interleaved with ours
                return Ok(());
            }
        }

        let ts = record.record_time;

        for elem in record.elems() {
            if matches!(elem.elem_type, ElemType::RIB | ElemType::ANNOUNCE) {
                // Reachability observed through route servers (or announced
                // locally by the collector) is not peer state: accept only
                // paths that start with the peer's own AS.
                let path = match &elem.as_path {
                    Some(path) if !path.is_empty() => path,
                    _ => continue,
                };
                if let Some(first) = path.first_asn() {
                    if first != elem.peer_asn {
                        continue;
                    }
                }
            }

            let sig = PeerSignature::new(&record.collector, elem.peer_ip, elem.peer_asn);
            let peer_id = registry.get_or_create(&sig)?;
            if view.peer(peer_id).is_none() {
                view.add_peer(peer_id, metrics::peer_label(&sig));
            }
            if let Some(peer) = view.peer_mut(peer_id) {
                peer.info.last_ts = ts;
            }
            c.peer_ids.insert(peer_id);

            match elem.elem_type {
                ElemType::ANNOUNCE | ElemType::WITHDRAW => match &elem.prefix {
                    Some(pfx) => updates::apply_prefix_update(
                        view,
                        peer_id,
                        elem.elem_type,
                        pfx,
                        elem.as_path.as_ref(),
                        ts,
                    ),
                    None => {
                        c.malformed_elem_cnt += 1;
                        warn!("update element without a prefix from {}", sig);
                    }
                },
                ElemType::RIB => match &elem.prefix {
                    Some(pfx) => {
                        updates::apply_rib_row(view, peer_id, pfx, elem.as_path.as_ref(), ts)
                    }
                    None => {
                        c.malformed_elem_cnt += 1;
                        warn!("rib element without a prefix from {}", sig);
                    }
                },
                ElemType::STATE => match elem.new_state {
                    Some(new_state) => updates::apply_state_update(view, peer_id, new_state, ts),
                    None => {
                        c.malformed_elem_cnt += 1;
                        warn!("state element without a state from {}", sig);
                    }
                },
            }
        }

        if record.dump_type == DumpType::Rib && record.dump_pos == DumpPosition::End {
            // promote the under-construction data and close the dump
            rib::end_of_valid_rib(view, c, config);
        }

        Ok(())
    }

    /// Advance `bgp_time_last` and recompute the collector's aggregate state
    /// from its peers.
    fn update_collector_state(view: &View, c: &mut Collector, record_time: u32) {
        if record_time > c.bgp_time_last {
            if record_time > c.bgp_time_last + WALL_UPDATE_PERIOD {
                c.wall_time_last = wall_time_now();
            }
            c.bgp_time_last = record_time;
        }

        let mut all_unknown = true;
        c.active_peers_cnt = 0;
        for peer_id in &c.peer_ids {
            if let Some(peer) = view.peer(*peer_id) {
                if peer.state.is_active() {
                    c.active_peers_cnt += 1;
                } else if peer.info.fsm_state != FsmState::Unknown {
                    all_unknown = false;
                }
            }
        }

        c.state = if c.active_peers_cnt > 0 {
            CollectorState::Up
        } else if !all_unknown {
            CollectorState::Down
        } else {
            CollectorState::Unknown
        };
    }

    /// Hand the current view to a sink, applying the full-feed filter.
    pub fn send_view(&self, sink: &mut dyn ViewSink) -> Result<(), SinkError> {
        sink.send_view(&self.view, &self.registry, &full_feed_filter)
    }

    /// Open an interval starting at `start_time` (BGP time).
    pub fn interval_start(&mut self, start_time: u32) {
        self.bgp_time_interval_start = start_time;
        self.wall_time_interval_start = wall_time_now();
        self.view.set_time(start_time);
    }

    /// Close the interval ending at `end_time`: publish the view and emit
    /// metrics. Sink failures are logged, never propagated.
    pub fn interval_end(
        &mut self,
        end_time: u32,
        view_sink: Option<&mut dyn ViewSink>,
        metrics_sink: Option<&mut dyn MetricsSink>,
    ) {
        if let Some(sink) = view_sink {
            if let Err(e) = self.send_view(sink) {
                warn!("view delivery failed for interval ending {}: {}", end_time, e);
            }
        }

        let now = wall_time_now();
        info!(
            "interval [{}, {}] processed in {}s",
            self.bgp_time_interval_start,
            end_time,
            now.saturating_sub(self.wall_time_interval_start)
        );

        if self.config.metrics_enabled {
            if let Some(sink) = metrics_sink {
                metrics::dump_metrics(
                    &self.config.metric_prefix,
                    self.collectors.values(),
                    &mut self.view,
                    sink,
                    now,
                );
            }
        }
    }
}
