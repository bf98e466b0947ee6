//! Outgoing connections
//!
//! [`Connector`] tries candidate addresses in order and keeps the last error
//! when all of them fail. Connection failures are returned, not reported;
//! what to do about them is the caller's call.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};

use socket2::{Domain, SockAddr as Socket2Addr, Socket, Type};

use super::{Error, Result, is_wildcard};

/// Where outgoing sockets are bound before connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Address(IpAddr),
    /// A network interface name, bound with SO_BINDTODEVICE.
    Interface(String),
}

impl Source {
    /// Parse a source string. The wildcard forms (`"all"`, `"any"`,
    /// empty) mean no source binding and yield None.
    pub fn parse(text: &str) -> Option<Source> {
        if is_wildcard(text) {
            return None;
        }
        let bare = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')).unwrap_or(text);
        match bare.parse::<IpAddr>() {
            Ok(ip) => Some(Source::Address(ip)),
            Err(_) => Some(Source::Interface(text.to_string())),
        }
    }
}

/// Connection builder.
#[derive(Debug, Clone)]
pub struct Connector {
    source: Option<Source>,
    socket_type: Type,
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector {
    /// Stream sockets, no source binding.
    pub fn new() -> Self {
        Connector {
            source: None,
            socket_type: Type::STREAM,
        }
    }

    /// Bind outgoing sockets to `source` first; see [`Source::parse`].
    pub fn source(mut self, source: &str) -> Self {
        self.source = Source::parse(source);
        self
    }

    /// Socket type used by [`connect`](Self::connect) (default: stream).
    pub fn socket_type(mut self, socket_type: Type) -> Self {
        self.socket_type = socket_type;
        self
    }

    /// Create a socket and bind it to the source, without connecting.
    ///
    /// For callers doing their own non-blocking connect. A source address of
    /// the other family is an [`Error::InvalidAddress`].
    pub fn client_create(&self, domain: Domain, socket_type: Type) -> Result<Socket> {
        let socket = Socket::new(domain, socket_type, None)?;

        match &self.source {
            None => {}
            Some(Source::Address(ip)) => {
                let matches = match ip {
                    IpAddr::V4(_) => domain == Domain::IPV4,
                    IpAddr::V6(_) => domain == Domain::IPV6,
                };
                if !matches {
                    return Err(Error::InvalidAddress(format!("source {ip} does not match socket family")));
                }
                socket.bind(&Socket2Addr::from(SocketAddr::new(*ip, 0)))?;
            }
            Some(Source::Interface(name)) => bind_interface(&socket, name)?,
        }

        tracing::trace!(?domain, source = ?self.source, "created client socket");
        Ok(socket)
    }

    /// Connect to the first candidate that accepts.
    ///
    /// Returns the error of the last attempt if every candidate fails, and
    /// [`Error::NoAddresses`] if there were none.
    pub fn connect<I>(&self, candidates: I) -> Result<Socket>
    where
        I: IntoIterator<Item = SocketAddr>,
    {
        let mut last_error = None;
        for addr in candidates {
            match self.connect_one(&addr) {
                Ok(socket) => {
                    tracing::debug!(%addr, "connected");
                    return Ok(socket);
                }
                Err(err) => {
                    tracing::debug!(%addr, error = %err, "connect attempt failed");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or(Error::NoAddresses))
    }

    /// Resolve `host` with the system resolver and connect to the results.
    pub fn connect_host(&self, host: &str, port: u16) -> Result<Socket> {
        let candidates: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::ResolutionFailed(format!("{host}: {e}")))?
            .collect();
        self.connect(candidates)
    }

    fn connect_one(&self, addr: &SocketAddr) -> Result<Socket> {
        let socket = self.client_create(Domain::for_address(*addr), self.socket_type)?;
        socket.connect(&Socket2Addr::from(*addr))?;
        Ok(socket)
    }
}

#[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
fn bind_interface(socket: &Socket, name: &str) -> Result<()> {
    socket.bind_device(Some(name.as_bytes()))?;
    Ok(())
}

#[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
fn bind_interface(_socket: &Socket, name: &str) -> Result<()> {
    Err(Error::Unsupported(format!("binding to interface {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, TcpListener, TcpStream};

    fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    /// An address nothing listens on: bind, note the port, close.
    fn dead_addr() -> SocketAddr {
        let (listener, addr) = listener();
        drop(listener);
        addr
    }

    #[test]
    fn test_source_parse() {
        assert_eq!(Source::parse("all"), None);
        assert_eq!(Source::parse("any"), None);
        assert_eq!(Source::parse(""), None);
        assert_eq!(Source::parse("127.0.0.1"), Some(Source::Address(IpAddr::V4(Ipv4Addr::LOCALHOST))));
        assert_eq!(Source::parse("[::1]"), Some(Source::Address("::1".parse().unwrap())));
        assert_eq!(Source::parse("eth0"), Some(Source::Interface("eth0".into())));
    }

    #[test]
    fn test_connect_first_success_wins() {
        let (listener, addr) = listener();
        let socket = Connector::new().connect([dead_addr(), addr]).unwrap();

        let mut stream: TcpStream = socket.into();
        let (mut server, _) = listener.accept().unwrap();
        stream.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_connect_keeps_last_error() {
        let err = Connector::new().connect([dead_addr(), dead_addr()]).unwrap_err();
        assert!(matches!(err, Error::Io(ref e) if e.raw_os_error() == Some(libc::ECONNREFUSED)));
    }

    #[test]
    fn test_connect_no_candidates() {
        let err = Connector::new().connect(std::iter::empty()).unwrap_err();
        assert!(matches!(err, Error::NoAddresses));
    }

    #[test]
    fn test_connect_with_source() {
        let (listener, addr) = listener();
        let socket = Connector::new().source("127.0.0.1").connect([addr]).unwrap();
        let local = socket.local_addr().unwrap().as_socket().unwrap();
        assert_eq!(local.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
        let (_, peer) = listener.accept().unwrap();
        assert_eq!(peer, local);
    }

    #[test]
    fn test_source_family_mismatch() {
        let err = Connector::new().source("::1").client_create(Domain::IPV4, Type::STREAM).unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(_)));
    }

    #[test]
    fn test_client_create_does_not_connect() {
        let socket = Connector::new().source("127.0.0.1").client_create(Domain::IPV4, Type::STREAM).unwrap();
        assert!(socket.peer_addr().is_err());
        let local = socket.local_addr().unwrap().as_socket().unwrap();
        assert_eq!(local.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    }

    #[test]
    fn test_connect_host() {
        let (listener, addr) = listener();
        let socket = Connector::new().connect_host("127.0.0.1", addr.port()).unwrap();
        let (_, peer) = listener.accept().unwrap();
        assert_eq!(socket.local_addr().unwrap().as_socket().unwrap(), peer);
    }

    #[test]
    fn test_connect_host_resolution_failure() {
        let err = Connector::new().connect_host("host.invalid.", 80).unwrap_err();
        assert!(matches!(err, Error::ResolutionFailed(_)));
    }
}
