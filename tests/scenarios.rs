//! End-to-end scenarios for the routing-tables engine: records in, view
//! state out.

use bgp_tables::models::*;
use bgp_tables::view::ViewState;
use bgp_tables::{RouteTables, TablesConfig};
use std::net::IpAddr;
use std::str::FromStr;

const COLLECTOR: &str = "rrc00";
const PROJECT: &str = "ris";

fn peer_ip(last_octet: u8) -> IpAddr {
    IpAddr::from_str(&format!("192.0.2.{}", last_octet)).unwrap()
}

fn pfx(s: &str) -> NetworkPrefix {
    NetworkPrefix::from_str(s).unwrap()
}

fn state_elem(ip: IpAddr, asn: u32, new_state: FsmState) -> BgpElem {
    BgpElem {
        elem_type: ElemType::STATE,
        peer_ip: ip,
        peer_asn: Asn::new(asn),
        new_state: Some(new_state),
        ..BgpElem::default()
    }
}

fn announce_elem(ip: IpAddr, asn: u32, prefix: &str, path: &[u32]) -> BgpElem {
    BgpElem {
        elem_type: ElemType::ANNOUNCE,
        peer_ip: ip,
        peer_asn: Asn::new(asn),
        prefix: Some(pfx(prefix)),
        as_path: Some(AsPath::from_sequence(path)),
        ..BgpElem::default()
    }
}

fn withdraw_elem(ip: IpAddr, asn: u32, prefix: &str) -> BgpElem {
    BgpElem {
        elem_type: ElemType::WITHDRAW,
        peer_ip: ip,
        peer_asn: Asn::new(asn),
        prefix: Some(pfx(prefix)),
        ..BgpElem::default()
    }
}

fn rib_elem(ip: IpAddr, asn: u32, prefix: &str, path: &[u32]) -> BgpElem {
    BgpElem {
        elem_type: ElemType::RIB,
        peer_ip: ip,
        peer_asn: Asn::new(asn),
        prefix: Some(pfx(prefix)),
        as_path: Some(AsPath::from_sequence(path)),
        ..BgpElem::default()
    }
}

fn update_record(record_time: u32, elems: Vec<BgpElem>) -> BgpRecord {
    BgpRecord {
        status: RecordStatus::Valid,
        dump_type: DumpType::Updates,
        dump_pos: DumpPosition::Middle,
        dump_time: 0,
        record_time,
        project: PROJECT.to_string(),
        collector: COLLECTOR.to_string(),
        elems,
    }
}

fn rib_record(
    dump_pos: DumpPosition,
    dump_time: u32,
    record_time: u32,
    elems: Vec<BgpElem>,
) -> BgpRecord {
    BgpRecord {
        status: RecordStatus::Valid,
        dump_type: DumpType::Rib,
        dump_pos,
        dump_time,
        record_time,
        project: PROJECT.to_string(),
        collector: COLLECTOR.to_string(),
        elems,
    }
}

fn corrupted_record(record_time: u32) -> BgpRecord {
    BgpRecord {
        status: RecordStatus::CorruptedRecord,
        dump_type: DumpType::Updates,
        dump_pos: DumpPosition::Middle,
        dump_time: 0,
        record_time,
        project: PROJECT.to_string(),
        collector: COLLECTOR.to_string(),
        elems: vec![],
    }
}

fn peer_id_of(tables: &RouteTables, ip: IpAddr, asn: u32) -> PeerId {
    tables
        .registry()
        .get_id(&PeerSignature::new(COLLECTOR, ip, Asn::new(asn)))
        .expect("peer should be registered")
}

/// Check the state invariants that must hold between record applications.
fn check_invariants(tables: &RouteTables) {
    let view = tables.view();

    for (peer_id, peer) in view.peers() {
        // established iff active
        assert_eq!(
            peer.state.is_active(),
            peer.info.fsm_state == FsmState::Established,
            "peer {} active/established mismatch",
            peer_id
        );
        if peer.info.uc_rib_start != 0 {
            assert!(peer.info.uc_rib_start <= peer.info.uc_rib_end);
        }
        if peer.info.ref_rib_start != 0 {
            assert!(peer.info.ref_rib_start <= peer.info.ref_rib_end);
        }
    }

    for (_, peer_id, cell) in view.pfx_peers() {
        let peer = view.peer(peer_id).expect("cell without a peer");
        if cell.state.is_active() {
            assert!(peer.state.is_active(), "active cell under inactive peer");
            assert!(!cell.origin.is_down(), "active cell with down origin");
            assert_ne!(cell.last_ts, 0, "active cell without live data");
        }
        if cell.last_ts == 0 {
            assert!(cell.origin.is_down());
            assert!(!cell.state.is_active());
        }
    }

    for collector in tables.collectors() {
        let active = collector
            .peer_ids
            .iter()
            .filter(|id| view.peer(**id).is_some_and(|p| p.state.is_active()))
            .count() as u32;
        assert_eq!(collector.active_peers_cnt, active);
        use bgp_tables::CollectorState;
        match collector.state {
            CollectorState::Up => assert!(active > 0),
            CollectorState::Down => {
                assert_eq!(active, 0);
                assert!(collector.peer_ids.iter().any(|id| view
                    .peer(*id)
                    .is_some_and(|p| p.info.fsm_state != FsmState::Unknown)));
            }
            CollectorState::Unknown => assert_eq!(active, 0),
        }

        if collector.uc_rib_dump_time == 0 {
            for id in &collector.peer_ids {
                if let Some(peer) = view.peer(*id) {
                    assert_eq!(peer.info.uc_rib_start, 0);
                }
            }
        }
    }
}

fn process_all(tables: &mut RouteTables, records: Vec<BgpRecord>) {
    let _ = env_logger::builder().is_test(true).try_init();
    for record in records {
        tables.process_record(&record).unwrap();
        check_invariants(tables);
    }
}

#[test]
fn test_simple_announce_withdraw() {
    let ip = peer_ip(1);
    let mut tables = RouteTables::new(TablesConfig::default());
    process_all(
        &mut tables,
        vec![
            update_record(100, vec![state_elem(ip, 65001, FsmState::Established)]),
            update_record(110, vec![announce_elem(ip, 65001, "10.0.0.0/24", &[65001])]),
            update_record(120, vec![withdraw_elem(ip, 65001, "10.0.0.0/24")]),
        ],
    );

    let peer_id = peer_id_of(&tables, ip, 65001);
    let peer = tables.view().peer(peer_id).unwrap();
    assert_eq!(peer.state, ViewState::Active);
    assert_eq!(peer.info.fsm_state, FsmState::Established);
    assert_eq!(peer.info.pfx_announcements_cnt, 1);
    assert_eq!(peer.info.pfx_withdrawals_cnt, 1);

    let (_, cell) = tables.view().find_cell(&pfx("10.0.0.0/24"), peer_id).unwrap();
    assert_eq!(cell.state, ViewState::Inactive);
    assert_eq!(cell.last_ts, 120);
    assert_eq!(cell.origin, Origin::Down);
    assert_eq!(cell.announcements, 1);
    assert_eq!(cell.withdrawals, 1);
}

#[test]
fn test_rib_promotion_backlog_rule() {
    let ip = peer_ip(2);
    let mut tables = RouteTables::new(TablesConfig::default());
    process_all(
        &mut tables,
        vec![
            update_record(900, vec![state_elem(ip, 65002, FsmState::Established)]),
            update_record(1000, vec![announce_elem(ip, 65002, "1.1.0.0/16", &[65002])]),
            rib_record(DumpPosition::Start, 1050, 1050, vec![]),
            rib_record(
                DumpPosition::Middle,
                1050,
                1052,
                vec![rib_elem(ip, 65002, "1.1.0.0/16", &[65002, 65999])],
            ),
            rib_record(DumpPosition::End, 1050, 1055, vec![]),
        ],
    );

    // The live update at t=1000 falls inside the backlog window before the
    // dump start: it was queued at the collector when the table was dumped,
    // so the RIB row (origin 65999) must not displace it.
    let peer_id = peer_id_of(&tables, ip, 65002);
    let (_, cell) = tables.view().find_cell(&pfx("1.1.0.0/16"), peer_id).unwrap();
    assert_eq!(cell.origin, Origin::Asn(Asn::new(65002)));
    assert_eq!(cell.last_ts, 1000);
    assert_eq!(cell.state, ViewState::Active);
    assert!(tables.view().peer(peer_id).unwrap().state.is_active());
    // the dump still becomes the reference window
    let collector = tables.collector(COLLECTOR).unwrap();
    assert_eq!(collector.ref_rib_dump_time, 1050);
    assert_eq!(collector.uc_rib_dump_time, 0);
}

#[test]
fn test_rib_reveals_missed_withdrawal() {
    let ip = peer_ip(3);
    let mut tables = RouteTables::new(TablesConfig::default());
    process_all(
        &mut tables,
        vec![
            update_record(900, vec![state_elem(ip, 65003, FsmState::Established)]),
            update_record(1000, vec![announce_elem(ip, 65003, "2.2.0.0/16", &[65003])]),
            rib_record(DumpPosition::Start, 2000, 2000, vec![]),
            // the dump mentions the peer but not 2.2.0.0/16
            rib_record(
                DumpPosition::Middle,
                2000,
                2005,
                vec![rib_elem(ip, 65003, "9.9.0.0/16", &[65003, 65777])],
            ),
            rib_record(DumpPosition::End, 2000, 2010, vec![]),
        ],
    );

    let peer_id = peer_id_of(&tables, ip, 65003);
    let (_, cell) = tables.view().find_cell(&pfx("2.2.0.0/16"), peer_id).unwrap();
    assert_eq!(cell.state, ViewState::Inactive);
    assert_eq!(cell.origin, Origin::Down);
    assert_eq!(cell.last_ts, 0);

    let peer = tables.view().peer(peer_id).unwrap();
    assert_eq!(peer.info.rib_positive_mismatches_cnt, 1);
    // the prefix the dump did carry is live
    let (_, kept) = tables.view().find_cell(&pfx("9.9.0.0/16"), peer_id).unwrap();
    assert_eq!(kept.origin, Origin::Asn(Asn::new(65777)));
    assert_eq!(kept.state, ViewState::Active);
}

#[test]
fn test_peer_down_wipes_live_and_uc() {
    let ip = peer_ip(4);
    let mut tables = RouteTables::new(TablesConfig::default());
    process_all(
        &mut tables,
        vec![
            update_record(500, vec![state_elem(ip, 65004, FsmState::Established)]),
            update_record(510, vec![announce_elem(ip, 65004, "3.3.0.0/16", &[65004])]),
            rib_record(DumpPosition::Start, 520, 520, vec![]),
            rib_record(
                DumpPosition::Middle,
                520,
                525,
                vec![rib_elem(ip, 65004, "3.3.0.0/16", &[65004])],
            ),
            // down at t=530 >= uc start 525: both generations go
            update_record(530, vec![state_elem(ip, 65004, FsmState::Idle)]),
        ],
    );

    let peer_id = peer_id_of(&tables, ip, 65004);
    let peer = tables.view().peer(peer_id).unwrap();
    assert_eq!(peer.state, ViewState::Inactive);
    assert_eq!(peer.info.fsm_state, FsmState::Idle);
    assert_eq!(peer.info.uc_rib_start, 0);

    let (_, cell) = tables.view().find_cell(&pfx("3.3.0.0/16"), peer_id).unwrap();
    assert_eq!(cell.state, ViewState::Inactive);
    assert_eq!(cell.last_ts, 0);
    assert_eq!(cell.origin, Origin::Down);
    assert_eq!(cell.uc_delta_ts, 0);
    assert_eq!(cell.uc_origin, Origin::Down);
}

#[test]
fn test_update_without_rib_context_is_dropped() {
    let ip = peer_ip(5);
    let mut tables = RouteTables::new(TablesConfig::default());
    process_all(
        &mut tables,
        vec![update_record(
            700,
            vec![announce_elem(ip, 65005, "4.4.0.0/16", &[65005])],
        )],
    );

    let peer_id = peer_id_of(&tables, ip, 65005);
    let peer = tables.view().peer(peer_id).unwrap();
    assert_eq!(peer.state, ViewState::Inactive);
    assert_eq!(peer.info.fsm_state, FsmState::Unknown);
    assert_eq!(peer.info.last_ts, 700);

    // the cell (if created) was reverted to untouched
    if let Some((_, cell)) = tables.view().find_cell(&pfx("4.4.0.0/16"), peer_id) {
        assert_eq!(cell.last_ts, 0);
        assert_eq!(cell.origin, Origin::Down);
        assert_eq!(cell.state, ViewState::Inactive);
        assert_eq!(cell.announcements, 0);
    }
}

#[test]
fn test_corrupted_record_mid_uc() {
    let ip1 = peer_ip(6);
    let ip2 = peer_ip(7);
    let mut tables = RouteTables::new(TablesConfig::default());
    process_all(
        &mut tables,
        vec![
            update_record(
                850,
                vec![
                    state_elem(ip1, 65006, FsmState::Established),
                    state_elem(ip2, 65007, FsmState::Established),
                ],
            ),
            rib_record(DumpPosition::Start, 900, 900, vec![]),
            rib_record(
                DumpPosition::Middle,
                900,
                905,
                vec![
                    rib_elem(ip1, 65006, "1.0.0.0/16", &[65006, 65100]),
                    rib_elem(ip2, 65007, "2.0.0.0/16", &[65007, 65200]),
                ],
            ),
            corrupted_record(910),
        ],
    );

    let collector = tables.collector(COLLECTOR).unwrap();
    assert_eq!(collector.corrupted_record_cnt, 1);

    for (ip, asn) in [(ip1, 65006), (ip2, 65007)] {
        let peer_id = peer_id_of(&tables, ip, asn);
        let peer = tables.view().peer(peer_id).unwrap();
        assert_eq!(peer.state, ViewState::Inactive);
        assert_eq!(peer.info.fsm_state, FsmState::Unknown);
        assert_eq!(peer.info.ref_rib_start, 0);
        assert_eq!(peer.info.uc_rib_start, 0);
        for (_, cell) in tables.view().cells_for_peer(peer_id) {
            assert_eq!(cell.last_ts, 0);
            assert_eq!(cell.uc_delta_ts, 0);
            assert_eq!(cell.uc_origin, Origin::Down);
        }
    }
}

#[test]
fn test_update_idempotence() -> anyhow::Result<()> {
    let ip = peer_ip(8);
    let mut tables = RouteTables::new(TablesConfig::default());
    let announce = update_record(110, vec![announce_elem(ip, 65008, "10.8.0.0/16", &[65008])]);
    tables.process_record(&update_record(
        100,
        vec![state_elem(ip, 65008, FsmState::Established)],
    ))?;
    tables.process_record(&announce)?;
    tables.process_record(&announce)?;
    check_invariants(&tables);

    let peer_id = peer_id_of(&tables, ip, 65008);
    let (_, cell) = tables.view().find_cell(&pfx("10.8.0.0/16"), peer_id).unwrap();
    assert_eq!(cell.last_ts, 110);
    assert_eq!(cell.origin, Origin::Asn(Asn::new(65008)));
    assert_eq!(cell.state, ViewState::Active);
    Ok(())
}

#[test]
fn test_out_of_order_update_suppressed() {
    let ip = peer_ip(9);
    let mut tables = RouteTables::new(TablesConfig::default());
    process_all(
        &mut tables,
        vec![
            update_record(100, vec![state_elem(ip, 65009, FsmState::Established)]),
            update_record(200, vec![announce_elem(ip, 65009, "10.9.0.0/16", &[65009])]),
            // an older withdrawal straggles in and must not regress the cell
            update_record(150, vec![withdraw_elem(ip, 65009, "10.9.0.0/16")]),
        ],
    );

    let peer_id = peer_id_of(&tables, ip, 65009);
    let (_, cell) = tables.view().find_cell(&pfx("10.9.0.0/16"), peer_id).unwrap();
    assert_eq!(cell.last_ts, 200);
    assert_eq!(cell.origin, Origin::Asn(Asn::new(65009)));
    assert_eq!(cell.state, ViewState::Active);
}

#[test]
fn test_route_server_paths_ignored() {
    let ip = peer_ip(10);
    let mut tables = RouteTables::new(TablesConfig::default());
    process_all(
        &mut tables,
        vec![
            update_record(100, vec![state_elem(ip, 65010, FsmState::Established)]),
            // path does not start with the peer AS: route-server observation
            update_record(110, vec![announce_elem(ip, 65010, "10.10.0.0/16", &[64999, 65010])]),
        ],
    );

    let peer_id = peer_id_of(&tables, ip, 65010);
    assert!(tables.view().find_cell(&pfx("10.10.0.0/16"), peer_id).is_none());
    assert_eq!(tables.view().peer(peer_id).unwrap().info.pfx_announcements_cnt, 0);
}

#[test]
fn test_rib_restart_aborts_previous_dump() {
    let ip = peer_ip(11);
    let mut tables = RouteTables::new(TablesConfig::default());
    process_all(
        &mut tables,
        vec![
            update_record(100, vec![state_elem(ip, 65011, FsmState::Established)]),
            rib_record(DumpPosition::Start, 200, 200, vec![]),
            rib_record(
                DumpPosition::Middle,
                200,
                205,
                vec![rib_elem(ip, 65011, "10.11.0.0/16", &[65011])],
            ),
            // a second dump starts before the first ended: stop-UC must leave
            // the state as if the first dump's rows were never applied
            rib_record(DumpPosition::Start, 300, 300, vec![]),
        ],
    );

    let collector = tables.collector(COLLECTOR).unwrap();
    assert_eq!(collector.uc_rib_dump_time, 300);
    assert_eq!(collector.uc_rib_start_time, 300);

    let peer_id = peer_id_of(&tables, ip, 65011);
    assert_eq!(tables.view().peer(peer_id).unwrap().info.uc_rib_start, 0);
    let (_, cell) = tables.view().find_cell(&pfx("10.11.0.0/16"), peer_id).unwrap();
    assert_eq!(cell.uc_delta_ts, 0);
    assert_eq!(cell.uc_origin, Origin::Down);
}

#[test]
fn test_interleaved_foreign_dump_rows_ignored() {
    let ip = peer_ip(12);
    let mut tables = RouteTables::new(TablesConfig::default());
    process_all(
        &mut tables,
        vec![
            rib_record(DumpPosition::Start, 400, 400, vec![]),
            // a row from some other dump shows up mid-stream
            rib_record(
                DumpPosition::Middle,
                999,
                405,
                vec![rib_elem(ip, 65012, "10.12.0.0/16", &[65012])],
            ),
        ],
    );

    // the foreign row was ignored entirely: no peer was even registered
    assert!(tables
        .registry()
        .get_id(&PeerSignature::new(COLLECTOR, ip, Asn::new(65012)))
        .is_none());
}

#[test]
fn test_reappearing_updates_reactivate_downed_peer() {
    let ip = peer_ip(13);
    let mut tables = RouteTables::new(TablesConfig::default());
    process_all(
        &mut tables,
        vec![
            update_record(100, vec![state_elem(ip, 65013, FsmState::Established)]),
            update_record(110, vec![state_elem(ip, 65013, FsmState::Idle)]),
            // the fsm state is known (not Unknown), so fresh reachability
            // re-establishes the session
            update_record(120, vec![announce_elem(ip, 65013, "10.13.0.0/16", &[65013])]),
        ],
    );

    let peer_id = peer_id_of(&tables, ip, 65013);
    let peer = tables.view().peer(peer_id).unwrap();
    assert_eq!(peer.state, ViewState::Active);
    assert_eq!(peer.info.fsm_state, FsmState::Established);
    assert_eq!(peer.info.ref_rib_start, 120);
    let (_, cell) = tables.view().find_cell(&pfx("10.13.0.0/16"), peer_id).unwrap();
    assert_eq!(cell.state, ViewState::Active);
}

#[test]
fn test_collector_state_transitions() {
    let ip = peer_ip(14);
    let mut tables = RouteTables::new(TablesConfig::default());
    use bgp_tables::CollectorState;

    // an update from a brand-new unknown peer is dropped: collector Unknown
    process_all(
        &mut tables,
        vec![update_record(
            100,
            vec![announce_elem(ip, 65014, "10.14.0.0/16", &[65014])],
        )],
    );
    assert_eq!(tables.collector(COLLECTOR).unwrap().state, CollectorState::Unknown);

    process_all(
        &mut tables,
        vec![update_record(110, vec![state_elem(ip, 65014, FsmState::Established)])],
    );
    assert_eq!(tables.collector(COLLECTOR).unwrap().state, CollectorState::Up);

    process_all(
        &mut tables,
        vec![update_record(120, vec![state_elem(ip, 65014, FsmState::Idle)])],
    );
    assert_eq!(tables.collector(COLLECTOR).unwrap().state, CollectorState::Down);
}

#[test]
fn test_silent_peer_demoted_at_rib_end() {
    let quiet_ip = peer_ip(15);
    let active_ip = peer_ip(16);
    let mut tables = RouteTables::new(TablesConfig::default());

    let mut records = vec![
        update_record(1000, vec![state_elem(quiet_ip, 65015, FsmState::Established)]),
        update_record(1010, vec![state_elem(active_ip, 65016, FsmState::Established)]),
    ];
    // one hour later the quiet peer has not been heard from and is absent
    // from the new dump
    let dump_time = 1000 + 3700;
    records.push(rib_record(DumpPosition::Start, dump_time, dump_time, vec![]));
    records.push(rib_record(
        DumpPosition::Middle,
        dump_time,
        dump_time + 5,
        vec![rib_elem(active_ip, 65016, "10.16.0.0/16", &[65016, 65300])],
    ));
    records.push(rib_record(DumpPosition::End, dump_time, dump_time + 10, vec![]));
    process_all(&mut tables, records);

    let quiet = tables.view().peer(peer_id_of(&tables, quiet_ip, 65015)).unwrap();
    assert_eq!(quiet.state, ViewState::Inactive);
    assert_eq!(quiet.info.fsm_state, FsmState::Unknown);

    let active = tables.view().peer(peer_id_of(&tables, active_ip, 65016)).unwrap();
    assert_eq!(active.state, ViewState::Active);
    assert_eq!(active.info.fsm_state, FsmState::Established);
}

#[test]
fn test_rib_reveals_missed_announcement() {
    let ip = peer_ip(17);
    let mut tables = RouteTables::new(TablesConfig::default());
    process_all(
        &mut tables,
        vec![
            update_record(100, vec![state_elem(ip, 65017, FsmState::Established)]),
            update_record(110, vec![announce_elem(ip, 65017, "5.5.0.0/16", &[65017])]),
            update_record(120, vec![withdraw_elem(ip, 65017, "5.5.0.0/16")]),
            // much later a dump carries the prefix again: the announcement
            // that re-added it was missed
            rib_record(DumpPosition::Start, 5000, 5000, vec![]),
            rib_record(
                DumpPosition::Middle,
                5000,
                5005,
                vec![rib_elem(ip, 65017, "5.5.0.0/16", &[65017, 65400])],
            ),
            rib_record(DumpPosition::End, 5000, 5010, vec![]),
        ],
    );

    let peer_id = peer_id_of(&tables, ip, 65017);
    let peer = tables.view().peer(peer_id).unwrap();
    assert_eq!(peer.info.rib_negative_mismatches_cnt, 1);

    let (_, cell) = tables.view().find_cell(&pfx("5.5.0.0/16"), peer_id).unwrap();
    assert_eq!(cell.origin, Origin::Asn(Asn::new(65400)));
    assert_eq!(cell.last_ts, 5005);
    assert_eq!(cell.state, ViewState::Active);
}
