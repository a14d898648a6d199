use crate::models::PeerId;
use num_enum::IntoPrimitive;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

/// How often (in BGP time) the collector's wall-clock reference is refreshed.
pub(crate) const WALL_UPDATE_PERIOD: u32 = 60;

/// Aggregate liveness of a collector, recomputed after every record.
///
/// Up when at least one peer is active; Down when none is active but at
/// least one has a known FSM state; Unknown otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, Serialize)]
#[repr(u8)]
pub enum CollectorState {
    Unknown = 0,
    Down = 1,
    Up = 2,
}

impl Display for CollectorState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorState::Unknown => write!(f, "unknown"),
            CollectorState::Down => write!(f, "down"),
            CollectorState::Up => write!(f, "up"),
        }
    }
}

/// Per-collector bookkeeping.
#[derive(Debug)]
pub struct Collector {
    pub name: String,
    /// Graphite-safe `<project>.<collector>` label used in metric keys.
    pub label: String,
    /// Peers ever observed through this collector.
    pub peer_ids: HashSet<PeerId>,
    /// Highest record timestamp seen for this collector.
    pub bgp_time_last: u32,
    /// Wall time when `bgp_time_last` last advanced past the refresh period.
    pub wall_time_last: u32,
    /// Identity of the currently authoritative RIB.
    pub ref_rib_dump_time: u32,
    pub ref_rib_start_time: u32,
    /// Identity of an in-progress RIB; zero when no dump is under
    /// construction.
    pub uc_rib_dump_time: u32,
    pub uc_rib_start_time: u32,
    pub state: CollectorState,
    pub active_peers_cnt: u32,
    pub valid_record_cnt: u32,
    pub corrupted_record_cnt: u32,
    pub empty_record_cnt: u32,
    pub malformed_elem_cnt: u32,
    /// Set once the first RIB reconciliation completes; views for this
    /// collector are meaningful from then on.
    pub publish_flag: bool,
}

impl Collector {
    pub(crate) fn new(name: String, label: String) -> Self {
        Collector {
            name,
            label,
            peer_ids: HashSet::new(),
            bgp_time_last: 0,
            wall_time_last: 0,
            ref_rib_dump_time: 0,
            ref_rib_start_time: 0,
            uc_rib_dump_time: 0,
            uc_rib_start_time: 0,
            state: CollectorState::Unknown,
            active_peers_cnt: 0,
            valid_record_cnt: 0,
            corrupted_record_cnt: 0,
            empty_record_cnt: 0,
            malformed_elem_cnt: 0,
            publish_flag: false,
        }
    }
}
