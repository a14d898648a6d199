//! RIB reconciliation: promoting an under-construction dump into the live
//! view, aborting stale dumps, and the partial resets driven by corrupted
//! records.

use crate::config::TablesConfig;
use crate::engine::collector::Collector;
use crate::engine::updates::reset_peer_cells;
use crate::models::*;
use crate::view::{self, View, ViewState};
use log::warn;
use std::collections::HashSet;

/// Abort the under-construction process of `c` without promoting anything.
///
/// Cells keep their live generation when their peer is active; cells of
/// inactive peers also lose the live data that was parked there waiting for
/// this dump.
pub(crate) fn stop_uc(view: &mut View, c: &mut Collector) {
    let View { peers, cells, .. } = view;
    for ((_, peer_id), cell) in cells.iter_mut() {
        if !c.peer_ids.contains(peer_id) {
            continue;
        }
        let peer = match peers.get(peer_id) {
            Some(peer) => peer,
            None => continue,
        };
        cell.clear_uc();
        if !peer.state.is_active() {
            cell.origin = Origin::Down;
            cell.last_ts = 0;
        }
    }

    for peer_id in &c.peer_ids {
        if let Some(peer) = peers.get_mut(peer_id) {
            peer.info.uc_rib_start = 0;
            peer.info.uc_rib_end = 0;
        }
    }

    c.uc_rib_dump_time = 0;
    c.uc_rib_start_time = 0;
}

/// Reconcile the completed dump of `c` with the live view.
///
/// For every cell of every peer that took part in the dump, the
/// under-construction data wins over the live data iff it is newer *and*
/// the live update does not fall into the backlog window just before the
/// dump started (such updates were queued at the collector when the dump
/// was taken and are fresher than the dump despite the smaller timestamp).
pub(crate) fn end_of_valid_rib(view: &mut View, c: &mut Collector, config: &TablesConfig) {
    let backlog_window = config.backlog_window_secs;

    {
        let View { tree, peers, cells, .. } = view;
        for ((node, peer_id), cell) in cells.iter_mut() {
            if !c.peer_ids.contains(peer_id) {
                continue;
            }
            let peer = match peers.get_mut(peer_id) {
                Some(peer) => peer,
                None => continue,
            };
            if peer.info.uc_rib_start == 0 {
                continue;
            }
            let family = match tree.prefix(*node) {
                Some(pfx) => pfx.family(),
                None => continue,
            };

            let uc_ts = cell.uc_delta_ts + peer.info.uc_rib_start;
            let in_backlog_window =
                cell.last_ts > peer.info.uc_rib_start.saturating_sub(backlog_window);

            if uc_ts > cell.last_ts && !in_backlog_window {
                // the dump knows better than the live state
                if !cell.uc_origin.is_down() {
                    if cell.last_ts != 0 && cell.origin.is_down() {
                        peer.info.rib_negative_mismatches_cnt += 1;
                        warn!(
                            "missed announcement: {} @ {} last state: {} rib: {}",
                            tree.prefix(*node).map(|p| p.to_string()).unwrap_or_default(),
                            peer.info.label,
                            cell.last_ts,
                            uc_ts
                        );
                    }
                    cell.last_ts = uc_ts;
                    cell.origin = cell.uc_origin;
                    peer.state = ViewState::Active;
                    peer.info.fsm_state = FsmState::Established;
                    peer.info.ref_rib_start = peer.info.uc_rib_start;
                    peer.info.ref_rib_end = peer.info.uc_rib_end;
                    view::set_cell_state(peer, family, cell, ViewState::Active);
                } else {
                    // live had data newer than the previous reference, but
                    // this dump does not carry the prefix: the withdrawal was
                    // missed
                    if cell.state.is_active() {
                        peer.info.rib_positive_mismatches_cnt += 1;
                        warn!(
                            "missed withdrawal: {} @ {} last state: {} rib: {}",
                            tree.prefix(*node).map(|p| p.to_string()).unwrap_or_default(),
                            peer.info.label,
                            cell.last_ts,
                            uc_ts
                        );
                    }
                    cell.last_ts = 0;
                    cell.origin = Origin::Down;
                    view::set_cell_state(peer, family, cell, ViewState::Inactive);
                }
            } else {
                // the live update is the more consistent information; keep it
                // and refresh the reference window
                if !cell.origin.is_down() {
                    peer.state = ViewState::Active;
                    peer.info.fsm_state = FsmState::Established;
                    peer.info.ref_rib_start = peer.info.uc_rib_start;
                    peer.info.ref_rib_end = peer.info.uc_rib_end;
                    view::set_cell_state(peer, family, cell, ViewState::Active);
                }
            }

            cell.clear_uc();
        }
    }

    // Peers that never showed up in the dump and have been silent for longer
    // than the inactivity timeout are gone: demote them. Everyone else gets
    // their UC window closed.
    let silence_horizon = c.bgp_time_last.saturating_sub(config.inactive_timeout_secs);
    let peer_ids: Vec<PeerId> = c.peer_ids.iter().copied().collect();
    for peer_id in peer_ids {
        let (uc_rib_start, last_ts, fsm_state) = match view.peer(peer_id) {
            Some(peer) => (peer.info.uc_rib_start, peer.info.last_ts, peer.info.fsm_state),
            None => continue,
        };
        if uc_rib_start == 0 && last_ts < silence_horizon {
            if fsm_state == FsmState::Established {
                if let Some(peer) = view.peer_mut(peer_id) {
                    peer.info.fsm_state = FsmState::Unknown;
                }
                reset_peer_cells(view, peer_id, false);
                view.set_peer_state(peer_id, ViewState::Inactive);
            }
        } else if let Some(peer) = view.peer_mut(peer_id) {
            peer.info.uc_rib_start = 0;
            peer.info.uc_rib_end = 0;
        }
    }

    c.publish_flag = true;
    c.ref_rib_dump_time = c.uc_rib_dump_time;
    c.ref_rib_start_time = c.uc_rib_start_time;
    c.uc_rib_dump_time = 0;
    c.uc_rib_start_time = 0;
}

/// Partial reset after a corrupted record for `c` at `ts`.
///
/// Live state is wiped for peers whose reference window includes `ts`; the
/// under-construction state is wiped for peers whose UC window includes
/// `ts`. Both can apply to the same peer.
pub(crate) fn process_corrupted_record(view: &mut View, c: &mut Collector, ts: u32) {
    let mut live_affected: HashSet<PeerId> = HashSet::new();
    let mut uc_affected: HashSet<PeerId> = HashSet::new();

    for peer_id in &c.peer_ids {
        if let Some(peer) = view.peer(*peer_id) {
            if peer.info.ref_rib_start != 0 && ts >= peer.info.ref_rib_start {
                live_affected.insert(*peer_id);
            }
            if peer.info.uc_rib_start != 0 && ts >= peer.info.uc_rib_start {
                uc_affected.insert(*peer_id);
            }
        }
    }

    {
        let View { tree, peers, cells, .. } = view;
        for ((node, peer_id), cell) in cells.iter_mut() {
            if live_affected.contains(peer_id) && cell.last_ts != 0 && cell.last_ts <= ts {
                cell.last_ts = 0;
                cell.origin = Origin::Down;
                if let (Some(peer), Some(pfx)) = (peers.get_mut(peer_id), tree.prefix(*node)) {
                    view::set_cell_state(peer, pfx.family(), cell, ViewState::Inactive);
                }
            }
            if uc_affected.contains(peer_id) {
                cell.clear_uc();
            }
        }
    }

    for peer_id in &live_affected {
        if let Some(peer) = view.peer_mut(*peer_id) {
            peer.info.fsm_state = FsmState::Unknown;
            peer.info.ref_rib_start = 0;
            peer.info.ref_rib_end = 0;
        }
        view.set_peer_state(*peer_id, ViewState::Inactive);
    }
    for peer_id in &uc_affected {
        if let Some(peer) = view.peer_mut(*peer_id) {
            peer.info.uc_rib_start = 0;
            peer.info.uc_rib_end = 0;
        }
    }
}
