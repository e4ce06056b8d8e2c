//! Listening socket construction.
//!
//! Candidates are tried in order and the first one that binds wins. With no
//! explicit bind address the candidates are the IPv6 wildcard (configured
//! dual-stack, so it also accepts IPv4) followed by the IPv4 wildcard, which
//! covers hosts without IPv6 or with `bindv6only` forced on.

use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
};

use mio::net::TcpListener;
use socket2::{Domain, Protocol, Socket, Type};

use crate::error::RelayError;

/// Addresses tried for `port`, in order.
pub fn candidate_addrs(bind_address: Option<IpAddr>, port: u16) -> Vec<SocketAddr> {
    match bind_address {
        Some(ip) => vec![SocketAddr::new(ip, port)],
        None => vec![
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        ],
    }
}

/// Bind and listen on `port`, returning a non-blocking listener.
///
/// Fails if no candidate binds or the bound socket cannot listen. There is no
/// retry and no fallback port.
pub fn bind_listener(
    bind_address: Option<IpAddr>,
    port: u16,
    backlog: i32,
) -> Result<TcpListener, RelayError> {
    let mut last_error = None;
    let mut bound = None;

    for addr in candidate_addrs(bind_address, port) {
        match bind_candidate(addr) {
            Ok(socket) => {
                bound = Some((socket, addr));
                break;
            },
            Err(e) => {
                tracing::debug!(%addr, error = %e, "bind candidate rejected");
                last_error = Some(e);
            },
        }
    }

    let Some((socket, addr)) = bound else {
        let source = last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no candidate addresses")
        });
        return Err(RelayError::Bind { port, source });
    };

    socket.listen(backlog).map_err(|source| RelayError::Listen { addr, source })?;
    socket.set_nonblocking(true)?;

    let listener = TcpListener::from_std(socket.into());
    tracing::info!(local = %listener.local_addr()?, backlog, "listening");
    Ok(listener)
}

fn bind_candidate(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;

    if addr.is_ipv6() && addr.ip().is_unspecified() {
        socket.set_only_v6(false)?;
    }

    socket.bind(&addr.into())?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use std::net::TcpStream;

    use super::*;

    #[test]
    fn wildcard_candidates_prefer_dual_stack() {
        let addrs = candidate_addrs(None, 9001);
        assert_eq!(addrs.len(), 2);
        assert!(addrs[0].is_ipv6());
        assert!(addrs[1].is_ipv4());
        assert!(addrs.iter().all(|a| a.port() == 9001 && a.ip().is_unspecified()));
    }

    #[test]
    fn explicit_address_is_sole_candidate() {
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert_eq!(candidate_addrs(Some(ip), 7), vec![SocketAddr::new(ip, 7)]);
    }

    #[test]
    fn binds_loopback_with_ephemeral_port() {
        let listener = bind_listener(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), 0, 10).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0, "OS should assign a port");

        TcpStream::connect(addr).unwrap();
    }

    #[test]
    fn wildcard_listener_accepts_ipv4_loopback() {
        let listener = bind_listener(None, 0, 10).unwrap();
        let port = listener.local_addr().unwrap().port();

        TcpStream::connect((Ipv4Addr::LOCALHOST, port)).unwrap();
    }

    #[test]
    fn port_in_use_is_a_bind_error() {
        let taken = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = bind_listener(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), port, 10);
        assert!(matches!(result, Err(RelayError::Bind { port: p, .. }) if p == port));
    }
}
