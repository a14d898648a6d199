use crate::models::*;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Base of the reserved ASN band used to encode origin sentinels on the wire.
///
/// The band lies inside the private-use range reserved by RFC6996
/// (4200000000..=4294967294), so no routable origin AS can collide with it.
pub const RESERVED_ORIGIN_BASE: u32 = 4_294_967_292;

const ORIGIN_LOCAL: u32 = RESERVED_ORIGIN_BASE;
const ORIGIN_SET_OR_CONFED: u32 = RESERVED_ORIGIN_BASE + 1;
const ORIGIN_DOWN: u32 = RESERVED_ORIGIN_BASE + 2;

/// Believed origin of a (prefix, peer) routing-table cell.
///
/// Besides a real origin AS, three non-values are distinguished:
/// - [Origin::Local]: the path was empty, i.e. the prefix is originated by
///   the collector-side router itself;
/// - [Origin::SetOrConfed]: the path ends in an AS-set or confederation
///   segment, so no single origin AS exists;
/// - [Origin::Down]: no route is currently believed to exist.
///
/// The wire encoding maps the non-values onto the reserved band starting at
/// [RESERVED_ORIGIN_BASE]; see [Origin::to_u32] and [Origin::from_u32].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum Origin {
    Asn(Asn),
    Local,
    SetOrConfed,
    Down,
}

impl Origin {
    /// Extracts the origin from an AS path per the rules above. The origin
    /// segment is the last segment of the path.
    pub fn from_path(path: &AsPath) -> Origin {
        match path.origin_segment() {
            None => Origin::Local,
            Some(AsPathSegment::Sequence(v)) => match v.last() {
                // an empty trailing sequence means the path carries no origin
                None => Origin::Local,
                // AS0 cannot originate routes (RFC7607); treat it like a
                // locally originated path
                Some(asn) if asn.to_u32() == 0 => Origin::Local,
                Some(asn) => Origin::Asn(*asn),
            },
            Some(_) => Origin::SetOrConfed,
        }
    }

    /// Compact 32-bit form for downstream consumers.
    pub const fn to_u32(self) -> u32 {
        match self {
            Origin::Asn(asn) => asn.to_u32(),
            Origin::Local => ORIGIN_LOCAL,
            Origin::SetOrConfed => ORIGIN_SET_OR_CONFED,
            Origin::Down => ORIGIN_DOWN,
        }
    }

    pub const fn from_u32(v: u32) -> Origin {
        match v {
            ORIGIN_LOCAL => Origin::Local,
            ORIGIN_SET_OR_CONFED => Origin::SetOrConfed,
            ORIGIN_DOWN => Origin::Down,
            asn => Origin::Asn(Asn::new(asn)),
        }
    }

    pub const fn is_down(&self) -> bool {
        matches!(self, Origin::Down)
    }
}

impl Default for Origin {
    fn default() -> Self {
        Origin::Down
    }
}

impl From<u32> for Origin {
    fn from(v: u32) -> Self {
        Origin::from_u32(v)
    }
}

impl From<Origin> for u32 {
    fn from(v: Origin) -> Self {
        v.to_u32()
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Asn(asn) => write!(f, "{}", asn),
            Origin::Local => write!(f, "local"),
            Origin::SetOrConfed => write!(f, "set-or-confed"),
            Origin::Down => write!(f, "down"),
        }
    }
}
