use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};
use std::net::IpAddr;
use std::ops::Deref;
use std::str::FromStr;

/// IP address family of a prefix or address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddrFamily {
    Ipv4,
    Ipv6,
}

impl AddrFamily {
    pub const fn of_addr(addr: &IpAddr) -> AddrFamily {
        match addr {
            IpAddr::V4(_) => AddrFamily::Ipv4,
            IpAddr::V6(_) => AddrFamily::Ipv6,
        }
    }

    /// Maximum mask length for the family.
    pub const fn max_bits(&self) -> u8 {
        match self {
            AddrFamily::Ipv4 => 32,
            AddrFamily::Ipv6 => 128,
        }
    }
}

impl Display for AddrFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AddrFamily::Ipv4 => write!(f, "ipv4"),
            AddrFamily::Ipv6 => write!(f, "ipv6"),
        }
    }
}

/// A representation of an IP prefix.
#[derive(PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkPrefix {
    pub prefix: IpNet,
}

impl Deref for NetworkPrefix {
    type Target = IpNet;

    fn deref(&self) -> &Self::Target {
        &self.prefix
    }
}

impl Debug for NetworkPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix)
    }
}

impl FromStr for NetworkPrefix {
    type Err = ipnet::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let prefix = IpNet::from_str(s)?;
        Ok(NetworkPrefix { prefix })
    }
}

impl From<IpNet> for NetworkPrefix {
    fn from(prefix: IpNet) -> Self {
        NetworkPrefix { prefix }
    }
}

impl NetworkPrefix {
    pub fn new(prefix: IpNet) -> NetworkPrefix {
        NetworkPrefix { prefix }
    }

    pub const fn family(&self) -> AddrFamily {
        match self.prefix {
            IpNet::V4(_) => AddrFamily::Ipv4,
            IpNet::V6(_) => AddrFamily::Ipv6,
        }
    }

    pub fn mask_len(&self) -> u8 {
        self.prefix.prefix_len()
    }

    /// Network-order bytes of the prefix address, for bit-level navigation.
    pub fn octets(&self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        match self.prefix {
            IpNet::V4(net) => buf[..4].copy_from_slice(&net.addr().octets()),
            IpNet::V6(net) => buf.copy_from_slice(&net.addr().octets()),
        }
        buf
    }
}

impl Display for NetworkPrefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix)
    }
}
