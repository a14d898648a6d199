use crate::models::*;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::net::IpAddr;

/// Compact identifier of a peering session, allocated by the peer registry.
///
/// Ids are non-zero, allocated sequentially from 1, and never reused for the
/// life of the process.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(pub u32);

impl PeerId {
    pub const MIN: PeerId = PeerId(u32::MIN);
    pub const MAX: PeerId = PeerId(u32::MAX);
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The triple identifying a peering session across runs: the collector the
/// session is observed at, and the peer's IP address and AS number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerSignature {
    pub collector: String,
    pub peer_ip: IpAddr,
    pub peer_asn: Asn,
}

impl PeerSignature {
    pub fn new(collector: &str, peer_ip: IpAddr, peer_asn: Asn) -> Self {
        PeerSignature {
            collector: collector.to_string(),
            peer_ip,
            peer_asn,
        }
    }
}

impl Display for PeerSignature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}|{}", self.collector, self.peer_ip, self.peer_asn)
    }
}
