//! Listening sockets
//!
//! [`Binder`] creates, configures and binds sockets for one family at a time
//! or for every usable family at once. Failures are reported as warnings
//! through the binder's [`Reporter`] and returned as errors; nothing here
//! retries.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use socket2::{Domain, SockAddr as Socket2Addr, Socket, Type};

use super::{Error, Result, is_wildcard};
use crate::message::{Reporter, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Ipv4,
    Ipv6,
}

impl Family {
    pub fn domain(self) -> Domain {
        match self {
            Family::Ipv4 => Domain::IPV4,
            Family::Ipv6 => Domain::IPV6,
        }
    }

    pub fn unspecified(self) -> IpAddr {
        match self {
            Family::Ipv4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Family::Ipv6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    fn of(addr: &SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(_) => Family::Ipv4,
            SocketAddr::V6(_) => Family::Ipv6,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Family::Ipv4 => "IPv4",
            Family::Ipv6 => "IPv6",
        })
    }
}

/// What happened to one family during [`Binder::bind_all`].
#[derive(Debug)]
pub enum FamilyOutcome {
    Bound,
    Failed(Error),
    /// The host does not support the family; nothing was attempted.
    Unavailable,
}

/// Result of [`Binder::bind_all`]: the bound sockets plus one outcome per
/// family, so "every family failed" and "no family was usable" are told
/// apart without guessing from an empty list.
#[derive(Debug, Default)]
pub struct BindAll {
    sockets: Vec<Socket>,
    outcomes: Vec<(Family, FamilyOutcome)>,
}

impl BindAll {
    pub fn sockets(&self) -> &[Socket] {
        &self.sockets
    }

    pub fn into_sockets(self) -> Vec<Socket> {
        self.sockets
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    pub fn outcomes(&self) -> &[(Family, FamilyOutcome)] {
        &self.outcomes
    }

    pub fn outcome(&self, family: Family) -> Option<&FamilyOutcome> {
        self.outcomes.iter().find(|(f, _)| *f == family).map(|(_, outcome)| outcome)
    }

    /// Families a bind was tried for, successful or not.
    pub fn attempted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !matches!(outcome, FamilyOutcome::Unavailable))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (Family, &Error)> {
        self.outcomes.iter().filter_map(|(family, outcome)| match outcome {
            FamilyOutcome::Failed(err) => Some((*family, err)),
            _ => None,
        })
    }

    /// Some families bound and some failed.
    pub fn is_partial(&self) -> bool {
        !self.sockets.is_empty() && self.failures().next().is_some()
    }
}

/// Socket binder with the options applied before every bind.
#[derive(Debug, Clone)]
pub struct Binder {
    reporter: Reporter,
    socket_type: Type,
    reuseaddr: bool,
    backlog: i32,
}

impl Default for Binder {
    fn default() -> Self {
        Self::new()
    }
}

impl Binder {
    /// Stream sockets with SO_REUSEADDR, listening with a backlog of 128,
    /// reporting through the process-wide reporter.
    pub fn new() -> Self {
        Binder {
            reporter: Reporter::global().clone(),
            socket_type: Type::STREAM,
            reuseaddr: true,
            backlog: 128,
        }
    }

    /// Report bind failures through `reporter` instead of the global one.
    pub fn reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Socket type to create (default: stream). Only stream sockets are put
    /// into the listening state.
    pub fn socket_type(mut self, socket_type: Type) -> Self {
        self.socket_type = socket_type;
        self
    }

    /// Set SO_REUSEADDR option (default: true)
    pub fn reuseaddr(mut self, reuse: bool) -> Self {
        self.reuseaddr = reuse;
        self
    }

    /// Set listen backlog (default: 128)
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Bind an IPv4 socket. `"any"`, `"all"` and `""` mean the wildcard
    /// address.
    pub fn bind_ipv4(&self, address: &str, port: u16) -> Result<Socket> {
        let ip = if is_wildcard(address) {
            Ipv4Addr::UNSPECIFIED
        } else {
            match address.parse::<Ipv4Addr>() {
                Ok(ip) => ip,
                Err(_) => return Err(self.invalid(Family::Ipv4, address)),
            }
        };
        self.bind(&SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Bind an IPv6 socket, IPv6-only. `"any"`, `"all"` and `""` mean the
    /// wildcard address; brackets around the address are accepted.
    pub fn bind_ipv6(&self, address: &str, port: u16) -> Result<Socket> {
        let ip = if is_wildcard(address) {
            Ipv6Addr::UNSPECIFIED
        } else {
            let bare = address.strip_prefix('[').and_then(|a| a.strip_suffix(']')).unwrap_or(address);
            match bare.parse::<Ipv6Addr>() {
                Ok(ip) => ip,
                Err(_) => return Err(self.invalid(Family::Ipv6, address)),
            }
        };
        self.bind(&SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create, configure and bind a socket for `addr`.
    pub fn bind(&self, addr: &SocketAddr) -> Result<Socket> {
        self.bind_with(addr, false)
    }

    /// Bind the wildcard address on `port` for IPv4 and then IPv6.
    ///
    /// A family the host does not support is skipped quietly. A failure in
    /// one family does not stop the other. With port 0 the IPv6 socket asks
    /// for the port the IPv4 socket was given, so both share one port.
    pub fn bind_all(&self, port: u16) -> BindAll {
        let mut result = BindAll::default();
        let mut port = port;

        for family in [Family::Ipv4, Family::Ipv6] {
            let addr = SocketAddr::new(family.unspecified(), port);
            let outcome = match self.bind_with(&addr, true) {
                Ok(socket) => {
                    if port == 0 {
                        if let Some(bound) = socket.local_addr().ok().and_then(|a| a.as_socket()) {
                            port = bound.port();
                        }
                    }
                    result.sockets.push(socket);
                    FamilyOutcome::Bound
                }
                Err(Error::UnsupportedFamily(_)) => FamilyOutcome::Unavailable,
                Err(err) => FamilyOutcome::Failed(err),
            };
            result.outcomes.push((family, outcome));
        }

        tracing::debug!(
            port,
            bound = result.len(),
            attempted = result.attempted(),
            "bind-all finished"
        );
        result
    }

    /// `probe` turns an unsupported family into a quiet
    /// [`Error::UnsupportedFamily`] instead of a warning.
    fn bind_with(&self, addr: &SocketAddr, probe: bool) -> Result<Socket> {
        let family = Family::of(addr);
        let socket = match Socket::new(family.domain(), self.socket_type, None) {
            Ok(socket) => socket,
            Err(err) if probe && is_family_unsupported(&err) => {
                tracing::debug!(%family, error = %err, "address family unavailable");
                return Err(Error::UnsupportedFamily(family.to_string()));
            }
            Err(err) => {
                self.report(&err, format_args!("cannot create {family} socket for {addr}"));
                return Err(err.into());
            }
        };

        if let Err(err) = self.configure(&socket, family) {
            self.report(&err, format_args!("cannot set socket options on {addr}"));
            return Err(err.into());
        }

        if let Err(err) = socket.bind(&Socket2Addr::from(*addr)) {
            self.report(&err, format_args!("cannot bind socket for {addr}"));
            return Err(err.into());
        }

        if self.socket_type == Type::STREAM {
            if let Err(err) = socket.listen(self.backlog) {
                self.report(&err, format_args!("cannot listen on {addr}"));
                return Err(err.into());
            }
        }

        tracing::debug!(%addr, "bound socket");
        Ok(socket)
    }

    fn configure(&self, socket: &Socket, family: Family) -> io::Result<()> {
        socket.set_reuse_address(self.reuseaddr)?;
        // Keep IPv6 sockets off the IPv4 space so both families can bind
        // the same port.
        if family == Family::Ipv6 {
            socket.set_only_v6(true)?;
        }
        Ok(())
    }

    fn invalid(&self, family: Family, address: &str) -> Error {
        self.reporter.warn(format_args!("invalid {family} address {address}"));
        Error::InvalidAddress(address.to_string())
    }

    fn report(&self, err: &io::Error, args: fmt::Arguments<'_>) {
        self.reporter.raise(Severity::Warn, err.raw_os_error(), args);
    }
}

fn is_family_unsupported(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EAFNOSUPPORT) | Some(libc::EPROTONOSUPPORT))
}
