/*!
The view: everything the engine currently believes about who routes what.

A view is a sparse peers × prefixes matrix. Peers and (prefix, peer) *cells*
are created on first mention and never deleted; both carry an
active/inactive flag, and a cell additionally carries two payload
generations: the live one and the under-construction (UC) one being built
from an in-progress RIB dump.

Storage is flat: prefixes live in the Patricia index, peers in an ordered
map, and cells in an ordered map keyed by `(NodeId, PeerId)`. Iteration in
(prefix, peer) order is produced by walking the prefix index in order and
ranging over each node's cell block; no cross-pointers exist between peers
and cells.
*/

use crate::models::*;
use crate::patricia::{NodeId, PatriciaTree};
use ipnet::IpNet;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Active/inactive flag carried by every peer and every cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViewState {
    Active,
    Inactive,
}

impl ViewState {
    pub fn is_active(&self) -> bool {
        matches!(self, ViewState::Active)
    }
}

/// Per-peer payload.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// Graphite-safe label used in metric keys.
    pub label: String,
    pub fsm_state: FsmState,
    /// Bounds of the RIB (or update stream) currently believed authoritative.
    pub ref_rib_start: u32,
    pub ref_rib_end: u32,
    /// Bounds of the RIB currently under construction; zero when none is.
    pub uc_rib_start: u32,
    pub uc_rib_end: u32,
    /// Most recent record timestamp that mentioned this peer.
    pub last_ts: u32,
    pub pfx_announcements_cnt: u32,
    pub pfx_withdrawals_cnt: u32,
    pub rib_messages_cnt: u32,
    pub state_messages_cnt: u32,
    /// Live had a route the RIB lacked (missed withdrawal).
    pub rib_positive_mismatches_cnt: u32,
    /// Live lacked a route the RIB had (missed announcement).
    pub rib_negative_mismatches_cnt: u32,
    /// Origin ASes seen announcing through this peer in the current interval.
    pub announcing_asns: HashSet<Asn>,
    pub announced_v4_pfxs: HashSet<NetworkPrefix>,
    pub announced_v6_pfxs: HashSet<NetworkPrefix>,
    pub withdrawn_v4_pfxs: HashSet<NetworkPrefix>,
    pub withdrawn_v6_pfxs: HashSet<NetworkPrefix>,
}

impl PeerInfo {
    pub fn new(label: String) -> Self {
        PeerInfo {
            label,
            fsm_state: FsmState::Unknown,
            ref_rib_start: 0,
            ref_rib_end: 0,
            uc_rib_start: 0,
            uc_rib_end: 0,
            last_ts: 0,
            pfx_announcements_cnt: 0,
            pfx_withdrawals_cnt: 0,
            rib_messages_cnt: 0,
            state_messages_cnt: 0,
            rib_positive_mismatches_cnt: 0,
            rib_negative_mismatches_cnt: 0,
            announcing_asns: HashSet::new(),
            announced_v4_pfxs: HashSet::new(),
            announced_v6_pfxs: HashSet::new(),
            withdrawn_v4_pfxs: HashSet::new(),
            withdrawn_v6_pfxs: HashSet::new(),
        }
    }

    /// Record interval statistics for one applied update element.
    pub(crate) fn track_update(&mut self, elem_type: ElemType, pfx: &NetworkPrefix, origin: Origin) {
        match elem_type {
            ElemType::ANNOUNCE => {
                if let Origin::Asn(asn) = origin {
                    self.announcing_asns.insert(asn);
                }
                match pfx.family() {
                    AddrFamily::Ipv4 => self.announced_v4_pfxs.insert(*pfx),
                    AddrFamily::Ipv6 => self.announced_v6_pfxs.insert(*pfx),
                };
            }
            ElemType::WITHDRAW => {
                match pfx.family() {
                    AddrFamily::Ipv4 => self.withdrawn_v4_pfxs.insert(*pfx),
                    AddrFamily::Ipv6 => self.withdrawn_v6_pfxs.insert(*pfx),
                };
            }
            _ => {}
        }
    }

    /// Clear the per-interval set statistics (after metric emission).
    pub(crate) fn clear_interval_sets(&mut self) {
        self.announcing_asns.clear();
        self.announced_v4_pfxs.clear();
        self.announced_v6_pfxs.clear();
        self.withdrawn_v4_pfxs.clear();
        self.withdrawn_v6_pfxs.clear();
    }
}

/// A peer as held by the view: payload, liveness, and active-cell counts per
/// family (maintained on every cell state change, so the full-feed predicate
/// is O(1)).
#[derive(Debug)]
pub struct Peer {
    pub state: ViewState,
    pub info: PeerInfo,
    active_v4_cells: u32,
    active_v6_cells: u32,
}

impl Peer {
    fn new(info: PeerInfo) -> Self {
        Peer {
            state: ViewState::Inactive,
            info,
            active_v4_cells: 0,
            active_v6_cells: 0,
        }
    }

    /// Number of active cells of the given family.
    pub fn active_pfx_cnt(&self, family: AddrFamily) -> u32 {
        match family {
            AddrFamily::Ipv4 => self.active_v4_cells,
            AddrFamily::Ipv6 => self.active_v6_cells,
        }
    }
}

/// Per-(prefix, peer) payload: the live generation and the one under
/// construction.
#[derive(Debug, Clone)]
pub struct Cell {
    pub state: ViewState,
    pub origin: Origin,
    /// Timestamp of the update that produced the live data; 0 means nothing
    /// is live.
    pub last_ts: u32,
    /// Offset of the contributing RIB row from the peer's `uc_rib_start`;
    /// 0 with `uc_origin == Down` means no UC data for this cell.
    pub uc_delta_ts: u32,
    pub uc_origin: Origin,
    pub announcements: u32,
    pub withdrawals: u32,
}

impl Default for Cell {
    fn default() -> Self {
        Cell {
            state: ViewState::Inactive,
            origin: Origin::Down,
            last_ts: 0,
            uc_delta_ts: 0,
            uc_origin: Origin::Down,
            announcements: 0,
            withdrawals: 0,
        }
    }
}

impl Cell {
    /// Clear the under-construction generation.
    pub(crate) fn clear_uc(&mut self) {
        self.uc_delta_ts = 0;
        self.uc_origin = Origin::Down;
    }
}

/// Configuration the view carries along to filter predicates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewConfig {
    pub v4_fullfeed_threshold: u32,
    pub v6_fullfeed_threshold: u32,
}

/// Set a cell's state, keeping the owning peer's active-cell counts in sync.
///
/// Free function so callers holding disjoint borrows of the peer and cell
/// maps can use it mid-iteration.
pub(crate) fn set_cell_state(peer: &mut Peer, family: AddrFamily, cell: &mut Cell, state: ViewState) {
    if cell.state == state {
        return;
    }
    cell.state = state;
    let count = match family {
        AddrFamily::Ipv4 => &mut peer.active_v4_cells,
        AddrFamily::Ipv6 => &mut peer.active_v6_cells,
    };
    match state {
        ViewState::Active => *count += 1,
        ViewState::Inactive => {
            debug_assert!(*count > 0, "active cell count underflow");
            *count -= 1;
        }
    }
}

/// The peers × prefixes view maintained by the engine.
pub struct View {
    pub(crate) tree: PatriciaTree<()>,
    pub(crate) peers: BTreeMap<PeerId, Peer>,
    pub(crate) cells: BTreeMap<(NodeId, PeerId), Cell>,
    /// Nominal start of the current interval.
    pub(crate) time: u32,
    pub(crate) config: ViewConfig,
}

impl Default for View {
    fn default() -> Self {
        Self::new()
    }
}

impl View {
    pub fn new() -> Self {
        View {
            tree: PatriciaTree::new(),
            peers: BTreeMap::new(),
            cells: BTreeMap::new(),
            time: 0,
            config: ViewConfig::default(),
        }
    }

    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn set_time(&mut self, time: u32) {
        self.time = time;
    }

    pub fn config(&self) -> ViewConfig {
        self.config
    }

    pub fn set_config(&mut self, config: ViewConfig) {
        self.config = config;
    }

    /// Look up a peer.
    pub fn peer(&self, id: PeerId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    pub fn peer_mut(&mut self, id: PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(&id)
    }

    /// Insert a peer if absent (created inactive, fsm Unknown) and return it.
    pub fn add_peer(&mut self, id: PeerId, label: String) -> &mut Peer {
        self.peers.entry(id).or_insert_with(|| Peer::new(PeerInfo::new(label)))
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Iterate peers in id order.
    pub fn peers(&self) -> impl Iterator<Item = (PeerId, &Peer)> {
        self.peers.iter().map(|(id, peer)| (*id, peer))
    }

    /// Creates the (pfx, peer) cell if absent with the given origin; a fresh
    /// cell starts inactive and callers activate it explicitly. Returns the
    /// prefix node id.
    pub fn add_pfx_peer(&mut self, pfx: &NetworkPrefix, peer_id: PeerId, origin: Origin) -> NodeId {
        let node = self.tree.insert(*pfx);
        self.cells.entry((node, peer_id)).or_insert_with(|| Cell {
            origin,
            ..Cell::default()
        });
        node
    }

    /// Finds the cell for an exact prefix, if both the prefix and the cell
    /// exist.
    pub fn find_cell(&self, pfx: &NetworkPrefix, peer_id: PeerId) -> Option<(NodeId, &Cell)> {
        let node = self.tree.search_exact(pfx)?;
        self.cells.get(&(node, peer_id)).map(|cell| (node, cell))
    }

    pub fn cell(&self, node: NodeId, peer_id: PeerId) -> Option<&Cell> {
        self.cells.get(&(node, peer_id))
    }

    pub fn cell_mut(&mut self, node: NodeId, peer_id: PeerId) -> Option<&mut Cell> {
        self.cells.get_mut(&(node, peer_id))
    }

    /// The prefix held at a node id.
    pub fn prefix(&self, node: NodeId) -> Option<&NetworkPrefix> {
        self.tree.prefix(node)
    }

    pub fn prefix_count(&self, family: AddrFamily) -> u64 {
        self.tree.prefix_count(family)
    }

    /// Set a cell's active flag, maintaining the peer's active-cell counts.
    pub fn set_cell_state(&mut self, node: NodeId, peer_id: PeerId, state: ViewState) {
        let family = match self.tree.prefix(node) {
            Some(pfx) => pfx.family(),
            None => return,
        };
        if let (Some(peer), Some(cell)) =
            (self.peers.get_mut(&peer_id), self.cells.get_mut(&(node, peer_id)))
        {
            set_cell_state(peer, family, cell, state);
        }
    }

    pub fn set_peer_state(&mut self, peer_id: PeerId, state: ViewState) {
        if let Some(peer) = self.peers.get_mut(&peer_id) {
            peer.state = state;
        }
    }

    /// Iterate the cells of one prefix in peer-id order.
    pub fn cells_for_prefix(&self, node: NodeId) -> impl Iterator<Item = (PeerId, &Cell)> {
        self.cells
            .range((node, PeerId::MIN)..=(node, PeerId::MAX))
            .map(|((_, peer_id), cell)| (*peer_id, cell))
    }

    /// Iterate the cells of one peer, in prefix-node order.
    pub fn cells_for_peer(&self, peer_id: PeerId) -> impl Iterator<Item = (NodeId, &Cell)> {
        self.cells
            .iter()
            .filter(move |((_, p), _)| *p == peer_id)
            .map(|((node, _), cell)| (*node, cell))
    }

    /// Iterate every (prefix, peer) cell in (prefix, peer-id) order, driven
    /// by the prefix index.
    pub fn pfx_peers(&self) -> impl Iterator<Item = (NetworkPrefix, PeerId, &Cell)> {
        self.tree.iter().flat_map(move |(node, pfx)| {
            self.cells
                .range((node, PeerId::MIN)..=(node, PeerId::MAX))
                .map(move |((_, peer_id), cell)| (pfx, *peer_id, cell))
        })
    }

    /// Serializable row of a published view, one per cell.
    pub fn export_rows<'a>(
        &'a self,
        registry: &'a crate::registry::PeerRegistry,
    ) -> impl Iterator<Item = ViewRow> + 'a {
        self.pfx_peers().filter_map(move |(pfx, peer_id, cell)| {
            let sig = registry.get_signature(peer_id)?;
            Some(ViewRow {
                time: self.time,
                prefix: pfx.prefix,
                peer_id,
                collector: sig.collector.clone(),
                peer_ip: sig.peer_ip.to_string(),
                peer_asn: sig.peer_asn,
                origin: cell.origin.to_u32(),
                active: cell.state.is_active(),
            })
        })
    }
}

/// One serialized (prefix, peer) row of a published view.
#[derive(Debug, Clone, Serialize)]
pub struct ViewRow {
    pub time: u32,
    pub prefix: IpNet,
    pub peer_id: PeerId,
    pub collector: String,
    pub peer_ip: String,
    pub peer_asn: Asn,
    pub origin: u32,
    pub active: bool,
}
