//! Metric key construction and interval-end emission.

use crate::engine::collector::Collector;
use crate::models::*;
use crate::sink::MetricsSink;
use crate::view::View;

/// Replace characters that are meaningful to graphite-style metric paths.
pub fn graphite_safe(s: &str) -> String {
    s.replace(['.', '*'], "-")
}

/// Metric label of a peer: `peer_asn.<asn>.ipv<v>_peer.__IP_<addr>`, with the
/// address made graphite-safe.
pub(crate) fn peer_label(sig: &PeerSignature) -> String {
    let version = match AddrFamily::of_addr(&sig.peer_ip) {
        AddrFamily::Ipv4 => 4,
        AddrFamily::Ipv6 => 6,
    };
    format!(
        "peer_asn.{}.ipv{}_peer.__IP_{}",
        sig.peer_asn,
        version,
        graphite_safe(&sig.peer_ip.to_string())
    )
}

/// Metric label of a collector: `<project>.<collector>`, both parts made
/// graphite-safe.
pub(crate) fn collector_label(project: &str, collector: &str) -> String {
    format!("{}.{}", graphite_safe(project), graphite_safe(collector))
}

/// Emit the per-collector and per-peer series for one interval, then clear
/// the per-interval set statistics.
pub(crate) fn dump_metrics<'a>(
    metric_prefix: &str,
    collectors: impl Iterator<Item = &'a Collector>,
    view: &mut View,
    sink: &mut dyn MetricsSink,
    time: u32,
) {
    let mut collector_peers: Vec<(String, Vec<PeerId>)> = Vec::new();

    for collector in collectors {
        let base = format!("{}.{}", metric_prefix, collector.label);
        sink.push(&format!("{}.active_peers_cnt", base), time, collector.active_peers_cnt as u64);
        sink.push(&format!("{}.valid_record_cnt", base), time, collector.valid_record_cnt as u64);
        sink.push(
            &format!("{}.corrupted_record_cnt", base),
            time,
            collector.corrupted_record_cnt as u64,
        );
        sink.push(&format!("{}.empty_record_cnt", base), time, collector.empty_record_cnt as u64);
        sink.push(&format!("{}.state", base), time, u8::from(collector.state) as u64);

        let mut ids: Vec<PeerId> = collector.peer_ids.iter().copied().collect();
        ids.sort_unstable();
        collector_peers.push((base, ids));
    }

    for (base, ids) in collector_peers {
        for peer_id in ids {
            let peer = match view.peer_mut(peer_id) {
                Some(peer) => peer,
                None => continue,
            };
            let info = &peer.info;
            let pbase = format!("{}.{}", base, info.label);
            sink.push(&format!("{}.bgp_fsm_state", pbase), time, u8::from(info.fsm_state) as u64);
            sink.push(&format!("{}.ref_rib_start", pbase), time, info.ref_rib_start as u64);
            sink.push(&format!("{}.ref_rib_end", pbase), time, info.ref_rib_end as u64);
            sink.push(&format!("{}.uc_rib_start", pbase), time, info.uc_rib_start as u64);
            sink.push(&format!("{}.uc_rib_end", pbase), time, info.uc_rib_end as u64);
            sink.push(
                &format!("{}.pfx_announcements_cnt", pbase),
                time,
                info.pfx_announcements_cnt as u64,
            );
            sink.push(
                &format!("{}.pfx_withdrawals_cnt", pbase),
                time,
                info.pfx_withdrawals_cnt as u64,
            );
            sink.push(&format!("{}.rib_messages_cnt", pbase), time, info.rib_messages_cnt as u64);
            sink.push(
                &format!("{}.state_messages_cnt", pbase),
                time,
                info.state_messages_cnt as u64,
            );
            sink.push(
                &format!("{}.rib_positive_mismatches_cnt", pbase),
                time,
                info.rib_positive_mismatches_cnt as u64,
            );
            sink.push(
                &format!("{}.rib_negative_mismatches_cnt", pbase),
                time,
                info.rib_negative_mismatches_cnt as u64,
            );
            sink.push(
                &format!("{}.announcing_asns_cnt", pbase),
                time,
                info.announcing_asns.len() as u64,
            );
            sink.push(
                &format!("{}.announced_v4_pfxs_cnt", pbase),
                time,
                info.announced_v4_pfxs.len() as u64,
            );
            sink.push(
                &format!("{}.announced_v6_pfxs_cnt", pbase),
                time,
                info.announced_v6_pfxs.len() as u64,
            );
            sink.push(
                &format!("{}.withdrawn_v4_pfxs_cnt", pbase),
                time,
                info.withdrawn_v4_pfxs.len() as u64,
            );
            sink.push(
                &format!("{}.withdrawn_v6_pfxs_cnt", pbase),
                time,
                info.withdrawn_v6_pfxs.len() as u64,
            );

            peer.info.clear_interval_sets();
        }
    }
}
