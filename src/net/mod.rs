//! Dual-stack networking
//!
//! Socket creation, binding and connecting for IPv4 and IPv6 alike, built on
//! `socket2`. Sockets are handed back as [`socket2::Socket`] and belong to the
//! caller from then on.

pub mod addr;
pub mod bind;
pub mod connect;
pub mod matching;

pub use addr::{SockAddr, sockaddr_equal, sockaddr_port, sockaddr_sprint};
pub use bind::{BindAll, Binder, Family, FamilyOutcome};
pub use connect::{Connector, Source};
pub use matching::addr_match;

/// Result type for network operations
pub type Result<T> = std::result::Result<T, Error>;

/// Network operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("address resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("no addresses to connect to")]
    NoAddresses,

    #[error("unsupported address family: {0}")]
    UnsupportedFamily(String),

    #[error("unsupported on this platform: {0}")]
    Unsupported(String),
}

/// True for the textual addresses meaning "every local address".
pub(crate) fn is_wildcard(address: &str) -> bool {
    address.is_empty() || address == "any" || address == "all"
}
