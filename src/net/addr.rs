//! Socket address handling
//!
//! [`SockAddr`] narrows a `socket2::SockAddr` to the two families this crate
//! understands. Anything else is kept as [`SockAddr::Other`] and never
//! compares equal to anything.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use super::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockAddr {
    V4(SocketAddrV4),
    V6(SocketAddrV6),
    /// An address of an unrecognized family, by family number.
    Other(i32),
}

impl SockAddr {
    /// Create an IPv4 socket address
    pub fn new_v4(ip: Ipv4Addr, port: u16) -> Self {
        SockAddr::V4(SocketAddrV4::new(ip, port))
    }

    /// Create an IPv6 socket address with no flow info or scope
    pub fn new_v6(ip: Ipv6Addr, port: u16) -> Self {
        SockAddr::V6(SocketAddrV6::new(ip, port, 0, 0))
    }

    /// Returns None for unrecognized families
    pub fn to_std(&self) -> Option<SocketAddr> {
        match self {
            SockAddr::V4(v4) => Some(SocketAddr::V4(*v4)),
            SockAddr::V6(v6) => Some(SocketAddr::V6(*v6)),
            SockAddr::Other(_) => None,
        }
    }

    /// The port, or 0 for unrecognized families.
    pub fn port(&self) -> u16 {
        match self {
            SockAddr::V4(v4) => v4.port(),
            SockAddr::V6(v6) => v6.port(),
            SockAddr::Other(_) => 0,
        }
    }

    /// Check if this is an IPv4 address
    pub fn is_ipv4(&self) -> bool {
        matches!(self, SockAddr::V4(_))
    }

    /// Check if this is an IPv6 address
    pub fn is_ipv6(&self) -> bool {
        matches!(self, SockAddr::V6(_))
    }

    /// Compare only the addresses, ignoring ports.
    ///
    /// Different families, including an IPv4 address and its IPv4-mapped
    /// IPv6 form, are unequal, as is anything of an unrecognized family.
    pub fn equal(&self, other: &Self) -> bool {
        match (self, other) {
            (SockAddr::V4(a), SockAddr::V4(b)) => a.ip() == b.ip(),
            (SockAddr::V6(a), SockAddr::V6(b)) => a.ip() == b.ip(),
            _ => false,
        }
    }

    /// The address without its port. IPv4-mapped IPv6 addresses are shown
    /// in IPv4 form. None for unrecognized families.
    pub fn addr_string(&self) -> Option<String> {
        match self {
            SockAddr::V4(v4) => Some(v4.ip().to_string()),
            SockAddr::V6(v6) => {
                let ip = v6.ip();
                match ip.to_ipv4_mapped() {
                    Some(ipv4) => Some(ipv4.to_string()),
                    None => Some(ip.to_string()),
                }
            }
            SockAddr::Other(_) => None,
        }
    }
}

impl fmt::Display for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SockAddr::V4(v4) => write!(f, "{}", v4),
            SockAddr::V6(v6) => write!(f, "{}", v6),
            SockAddr::Other(family) => write!(f, "<family {}>", family),
        }
    }
}

impl From<SocketAddr> for SockAddr {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => SockAddr::V4(v4),
            SocketAddr::V6(v6) => SockAddr::V6(v6),
        }
    }
}

impl From<&socket2::SockAddr> for SockAddr {
    fn from(addr: &socket2::SockAddr) -> Self {
        match addr.as_socket() {
            Some(std) => SockAddr::from(std),
            None => SockAddr::Other(i32::from(addr.family())),
        }
    }
}

impl TryFrom<SockAddr> for SocketAddr {
    type Error = Error;

    fn try_from(addr: SockAddr) -> Result<Self> {
        addr.to_std()
            .ok_or_else(|| Error::UnsupportedFamily(format!("{} has no IP form", addr)))
    }
}

/// Whether two socket addresses name the same host address, ports ignored.
pub fn sockaddr_equal(a: &socket2::SockAddr, b: &socket2::SockAddr) -> bool {
    SockAddr::from(a).equal(&SockAddr::from(b))
}

/// Port of `addr`, or 0 when the family has none.
pub fn sockaddr_port(addr: &socket2::SockAddr) -> u16 {
    SockAddr::from(addr).port()
}

/// Textual form of the address part of `addr`.
pub fn sockaddr_sprint(addr: &socket2::SockAddr) -> Option<String> {
    SockAddr::from(addr).addr_string()
}
