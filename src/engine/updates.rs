//! Folding a single update, state-change, or RIB-row element into the view.

use crate::models::*;
use crate::view::{self, View, ViewState};

/// Apply an announcement or withdrawal for `pfx` observed through `peer_id`
/// at time `ts`.
///
/// The peer must already exist in the view (active or inactive); the cell is
/// created on demand. Out-of-order elements (older than the cell's live
/// data) change nothing.
pub(crate) fn apply_prefix_update(
    view: &mut View,
    peer_id: PeerId,
    elem_type: ElemType,
    pfx: &NetworkPrefix,
    path: Option<&AsPath>,
    ts: u32,
) {
    debug_assert!(matches!(elem_type, ElemType::ANNOUNCE | ElemType::WITHDRAW));

    let origin = match elem_type {
        ElemType::ANNOUNCE => path.map_or(Origin::Local, Origin::from_path),
        _ => Origin::Down,
    };

    {
        let peer = view
            .peer_mut(peer_id)
            .expect("peer must exist before an update is applied");
        match elem_type {
            ElemType::ANNOUNCE => peer.info.pfx_announcements_cnt += 1,
            _ => peer.info.pfx_withdrawals_cnt += 1,
        }
        peer.info.track_update(elem_type, pfx, origin);
    }

    let node = view.add_pfx_peer(pfx, peer_id, origin);
    let family = pfx.family();

    let View { peers, cells, .. } = view;
    let peer = peers
        .get_mut(&peer_id)
        .expect("peer must exist before an update is applied");
    let cell = cells
        .get_mut(&(node, peer_id))
        .expect("cell was just created");

    if ts < cell.last_ts {
        // the update is old and does not change the state
        return;
    }

    cell.last_ts = ts;
    cell.origin = origin;
    match elem_type {
        ElemType::ANNOUNCE => cell.announcements += 1,
        _ => cell.withdrawals += 1,
    }

    match peer.state {
        ViewState::Active => {
            let announce = elem_type.is_announce();
            if announce && !cell.state.is_active() {
                view::set_cell_state(peer, family, cell, ViewState::Active);
            } else if !announce && cell.state.is_active() {
                view::set_cell_state(peer, family, cell, ViewState::Inactive);
            }
        }
        ViewState::Inactive => {
            debug_assert!(
                !cell.state.is_active(),
                "cells of an inactive peer must be inactive"
            );
            if peer.info.fsm_state == FsmState::Unknown {
                if peer.info.uc_rib_start == 0 {
                    // No RIB context at all: nothing anchors this update, so
                    // revert the cell to untouched and forget the event.
                    cell.last_ts = 0;
                    cell.origin = Origin::Down;
                    match elem_type {
                        ElemType::ANNOUNCE => cell.announcements -= 1,
                        _ => cell.withdrawals -= 1,
                    }
                }
                // with a RIB under construction the cell data is kept for
                // reconciliation at RIB end, everything stays inactive
            } else {
                // the session went down earlier; fresh reachability
                // information means it is established again
                peer.state = ViewState::Active;
                peer.info.fsm_state = FsmState::Established;
                peer.info.ref_rib_start = ts;
                peer.info.ref_rib_end = ts;
                if elem_type.is_announce() {
                    view::set_cell_state(peer, family, cell, ViewState::Active);
                }
            }
        }
    }
}

/// Apply a peer FSM state change at time `ts`.
pub(crate) fn apply_state_update(view: &mut View, peer_id: PeerId, new_state: FsmState, ts: u32) {
    let (prior, uc_rib_start) = {
        let peer = view
            .peer_mut(peer_id)
            .expect("peer must exist before a state update is applied");
        peer.info.state_messages_cnt += 1;
        (peer.info.fsm_state, peer.info.uc_rib_start)
    };

    if prior == FsmState::Established && new_state != FsmState::Established {
        // session down: the live table is no longer credible
        let reset_uc = ts >= uc_rib_start;
        {
            let peer = view.peer_mut(peer_id).expect("peer exists");
            peer.info.fsm_state = new_state;
            peer.info.ref_rib_start = ts;
            peer.info.ref_rib_end = ts;
            if reset_uc {
                peer.info.uc_rib_start = 0;
                peer.info.uc_rib_end = 0;
            }
        }
        reset_peer_cells(view, peer_id, reset_uc);
        view.set_peer_state(peer_id, ViewState::Inactive);
    } else if prior != FsmState::Established && new_state == FsmState::Established {
        let peer = view.peer_mut(peer_id).expect("peer exists");
        peer.state = ViewState::Active;
        peer.info.fsm_state = new_state;
        peer.info.ref_rib_start = ts;
        peer.info.ref_rib_end = ts;
    } else if prior != new_state {
        // no liveness change, but track the FSM state anyway
        let peer = view.peer_mut(peer_id).expect("peer exists");
        peer.info.fsm_state = new_state;
        peer.info.ref_rib_start = ts;
        peer.info.ref_rib_end = ts;
    }

    if let Some(peer) = view.peer(peer_id) {
        debug_assert_eq!(
            peer.info.fsm_state == FsmState::Established,
            peer.state.is_active(),
            "peer {} violates established-iff-active",
            peer_id
        );
    }
}

/// Apply one row of an in-progress RIB dump. Only the under-construction
/// generation of the cell is touched.
pub(crate) fn apply_rib_row(
    view: &mut View,
    peer_id: PeerId,
    pfx: &NetworkPrefix,
    path: Option<&AsPath>,
    ts: u32,
) {
    let uc_rib_start = {
        let peer = view
            .peer_mut(peer_id)
            .expect("peer must exist before a RIB row is applied");
        if peer.info.uc_rib_start == 0 {
            // first row of this dump for this peer
            peer.info.uc_rib_start = ts;
        }
        peer.info.uc_rib_end = ts;
        peer.info.rib_messages_cnt += 1;
        peer.info.uc_rib_start
    };

    let node = view.add_pfx_peer(pfx, peer_id, Origin::Down);
    let cell = view.cell_mut(node, peer_id).expect("cell was just created");
    cell.uc_delta_ts = ts.saturating_sub(uc_rib_start);
    cell.uc_origin = path.map_or(Origin::Local, Origin::from_path);
}

/// Wipe the live generation of every cell of `peer_id` (and the UC
/// generation too when `reset_uc`), deactivating the cells. This is the
/// reset used when a peer goes down.
pub(crate) fn reset_peer_cells(view: &mut View, peer_id: PeerId, reset_uc: bool) {
    let View { tree, peers, cells, .. } = view;
    let peer = match peers.get_mut(&peer_id) {
        Some(peer) => peer,
        None => return,
    };
    for ((node, cell_peer), cell) in cells.iter_mut() {
        if *cell_peer != peer_id {
            continue;
        }
        cell.origin = Origin::Down;
        cell.last_ts = 0;
        if reset_uc {
            cell.clear_uc();
        }
        if let Some(pfx) = tree.prefix(*node) {
            view::set_cell_state(peer, pfx.family(), cell, ViewState::Inactive);
        }
    }
}
