//! Network utility functions
//!
//! This module provides utility functions for network operations.

use http::uri::Authority;
use log::debug;
use socket2::{Domain, Protocol, SockRef, Socket, TcpKeepalive, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

use super::error::{ProxyError, Result};

/// Parse a socket address
///
/// Accepts the `:port` shorthand for "all interfaces" in addition to regular
/// `host:port` forms. The shorthand expands to `[::]:port`, which
/// `bind_listener` opens for IPv4 and IPv6 clients alike.
///
/// # Arguments
///
/// * `addr` - The address string to parse
///
/// # Returns
///
/// The parsed `SocketAddr`
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    let addr = addr.trim();
    let expanded;
    let addr = if addr.starts_with(':') {
        expanded = format!("[::]{}", addr);
        expanded.as_str()
    } else {
        addr
    };

    // Try direct parsing first
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    // Try using ToSocketAddrs trait
    match addr.to_socket_addrs() {
        Ok(mut addrs) => {
            if let Some(addr) = addrs.next() {
                Ok(addr)
            } else {
                Err(ProxyError::Config(format!("Failed to parse address: {}", addr)))
            }
        }
        Err(e) => Err(ProxyError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Strip a trailing `:port` from a host string
///
/// Bracketed IPv6 literals lose their brackets; a bare IPv6 address (more
/// than one colon, no brackets) is returned unchanged.
pub fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &rest[..end],
            None => host,
        };
    }

    match host.rsplit_once(':') {
        Some((name, port))
            if !name.contains(':') && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            name
        }
        _ => host,
    }
}

/// Bind a listening TCP socket
///
/// The IPv6 wildcard is bound dual-stack so IPv4 clients are accepted too.
/// On hosts without IPv6 it falls back to the IPv4 wildcard.
pub fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    if addr.ip() != IpAddr::V6(Ipv6Addr::UNSPECIFIED) {
        return listen(addr);
    }

    match listen(addr) {
        Err(e) if e.kind() != io::ErrorKind::AddrInUse => {
            debug!("Dual-stack bind of {} failed ({}), using IPv4 only", addr, e);
            listen(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), addr.port()))
        }
        result => result,
    }
}

fn listen(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}

/// `host[:port]` of an authority, dropping any `user:pass@` prefix
pub fn bare_authority(authority: &Authority) -> String {
    match authority.port() {
        Some(port) => format!("{}:{}", authority.host(), port.as_str()),
        None => authority.host().to_string(),
    }
}

/// Enable TCP keep-alive probes on a connected stream
pub fn set_keepalive(stream: &TcpStream, interval: Duration) -> std::io::Result<()> {
    let keepalive = TcpKeepalive::new().with_time(interval);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}
