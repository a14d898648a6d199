use crate::models::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;

/// Status a record source attaches to each record it yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordStatus {
    Valid,
    CorruptedSource,
    CorruptedRecord,
    FilteredSource,
    EmptySource,
}

/// Type of the dump a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DumpType {
    Rib,
    Updates,
}

/// Position of a record within its dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DumpPosition {
    Start,
    Middle,
    End,
}

/// BGP finite-state-machine state of a peering session.
///
/// `Unknown` is not a protocol state: it marks peers we have seen mentioned
/// but for which no authoritative session information exists yet.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum FsmState {
    Unknown = 0,
    Idle = 1,
    Connect = 2,
    Active = 3,
    OpenSent = 4,
    OpenConfirm = 5,
    Established = 6,
}

impl Display for FsmState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FsmState::Unknown => "unknown",
            FsmState::Idle => "idle",
            FsmState::Connect => "connect",
            FsmState::Active => "active",
            FsmState::OpenSent => "opensent",
            FsmState::OpenConfirm => "openconfirm",
            FsmState::Established => "established",
        };
        write!(f, "{}", s)
    }
}

/// Element type.
///
/// - RIB: one row of a routing-table dump
/// - ANNOUNCE: announcement/reachable prefix
/// - WITHDRAW: withdrawn/unreachable prefix
/// - STATE: peer FSM state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElemType {
    RIB,
    ANNOUNCE,
    WITHDRAW,
    STATE,
}

impl ElemType {
    pub fn is_announce(&self) -> bool {
        matches!(self, ElemType::ANNOUNCE)
    }
}

/// BgpElem represents a per-prefix (or per-peer, for state changes) BGP
/// element within one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpElem {
    #[serde(rename = "type")]
    pub elem_type: ElemType,
    pub peer_ip: IpAddr,
    pub peer_asn: Asn,
    pub prefix: Option<NetworkPrefix>,
    pub as_path: Option<AsPath>,
    pub new_state: Option<FsmState>,
}

impl Default for BgpElem {
    fn default() -> Self {
        BgpElem {
            elem_type: ElemType::ANNOUNCE,
            peer_ip: IpAddr::from_str("0.0.0.0").unwrap(),
            peer_asn: Asn::RESERVED,
            prefix: None,
            as_path: None,
            new_state: None,
        }
    }
}

/// One record yielded by a record source: dump attributes plus the decoded
/// elements. Element production upstream is lazy; by the time a record
/// reaches the engine it is a finite, fully-owned sequence that is consumed
/// to completion before the next record starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpRecord {
    pub status: RecordStatus,
    pub dump_type: DumpType,
    pub dump_pos: DumpPosition,
    /// Identity of the dump this record belongs to (the time the dump was
    /// requested), shared by all records of one dump.
    pub dump_time: u32,
    /// Timestamp of this record's data.
    pub record_time: u32,
    pub project: String,
    pub collector: String,
    pub elems: Vec<BgpElem>,
}

impl BgpRecord {
    /// An elements iterator; the engine folds these in order.
    pub fn elems(&self) -> impl Iterator<Item = &BgpElem> {
        self.elems.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsm_state_values() {
        assert_eq!(FsmState::try_from(6u8).unwrap(), FsmState::Established);
        assert_eq!(u8::from(FsmState::Unknown), 0);
        assert!(FsmState::try_from(7u8).is_err());
    }
}
