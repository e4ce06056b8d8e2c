//! Per-connection state and the socket side of [`PeerIo`].
//!
//! Sockets are non-blocking. Bytes the kernel does not take immediately are
//! queued in the peer's outbox and written when the socket reports writable.
//! The outbox is capped; a peer that falls further behind than the cap fails
//! its next send.

use std::{
    collections::HashMap,
    io::{self, Read, Write},
    net::SocketAddr,
};

use bytes::{Buf, BytesMut};
use chorus_core::PeerIo;
use mio::{Interest, Registry, Token, net::TcpStream};

/// One connected peer.
#[derive(Debug)]
pub(crate) struct Peer<S = TcpStream> {
    stream: S,
    addr: SocketAddr,
    outbox: BytesMut,
    outbox_limit: usize,
}

impl<S: Read + Write> Peer<S> {
    pub(crate) fn new(stream: S, addr: SocketAddr, outbox_limit: usize) -> Self {
        Self { stream, addr, outbox: BytesMut::new(), outbox_limit }
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Whether bytes are waiting for the socket to become writable.
    pub(crate) fn has_pending(&self) -> bool {
        !self.outbox.is_empty()
    }

    pub(crate) fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    /// Write `message`, queueing whatever the socket does not accept now.
    ///
    /// Queued bytes keep their order: once anything is queued, later messages
    /// go straight to the outbox until it drains.
    pub(crate) fn send(&mut self, message: &[u8]) -> io::Result<()> {
        if self.has_pending() {
            return self.enqueue(message);
        }

        let written = write_available(&mut self.stream, message)?;
        if written < message.len() {
            self.enqueue(&message[written..])?;
        }
        Ok(())
    }

    /// Write as much of the outbox as the socket takes.
    pub(crate) fn flush(&mut self) -> io::Result<()> {
        let written = write_available(&mut self.stream, &self.outbox)?;
        self.outbox.advance(written);
        Ok(())
    }

    fn enqueue(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.outbox.len() + bytes.len() > self.outbox_limit {
            return Err(io::Error::other(format!(
                "outbox limit of {} bytes exceeded",
                self.outbox_limit
            )));
        }
        self.outbox.extend_from_slice(bytes);
        Ok(())
    }
}

/// Write until done or the writer would block, returning the bytes written.
fn write_available<W: Write>(writer: &mut W, bytes: &[u8]) -> io::Result<usize> {
    let mut written = 0;
    while written < bytes.len() {
        match writer.write(&bytes[written..]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) => return Err(e),
        }
    }
    Ok(written)
}

/// Every connected peer, keyed by poll token.
///
/// Tracks which peers changed between "outbox empty" and "outbox pending" so
/// the event loop can adjust their poll interest afterwards.
pub(crate) struct Peers {
    registry: Registry,
    peers: HashMap<Token, Peer>,
    backlog_changed: Vec<Token>,
}

impl Peers {
    pub(crate) fn new(registry: Registry) -> Self {
        Self { registry, peers: HashMap::new(), backlog_changed: Vec::new() }
    }

    /// Register `peer` with the poller for reads and start tracking it.
    pub(crate) fn insert(&mut self, token: Token, mut peer: Peer) -> io::Result<()> {
        self.registry.register(peer.stream_mut(), token, Interest::READABLE)?;
        self.peers.insert(token, peer);
        Ok(())
    }

    pub(crate) fn get_mut(&mut self, token: Token) -> Option<&mut Peer> {
        self.peers.get_mut(&token)
    }

    /// Whether `token` has queued bytes. `None` if the peer is gone.
    pub(crate) fn has_pending(&self, token: Token) -> Option<bool> {
        self.peers.get(&token).map(Peer::has_pending)
    }

    pub(crate) fn len(&self) -> usize {
        self.peers.len()
    }

    /// Flush the outbox of `token` after a writable event.
    pub(crate) fn flush(&mut self, token: Token) -> io::Result<()> {
        let Some(peer) = self.peers.get_mut(&token) else {
            return Ok(());
        };

        let was_pending = peer.has_pending();
        peer.flush()?;
        if peer.has_pending() != was_pending {
            self.backlog_changed.push(token);
        }
        Ok(())
    }

    pub(crate) fn reregister(&mut self, token: Token, interest: Interest) -> io::Result<()> {
        match self.peers.get_mut(&token) {
            Some(peer) => self.registry.reregister(peer.stream_mut(), token, interest),
            None => Ok(()),
        }
    }

    /// Tokens whose outbox went from empty to pending or back.
    pub(crate) fn take_backlog_changes(&mut self) -> Vec<Token> {
        std::mem::take(&mut self.backlog_changed)
    }
}

impl PeerIo<Token> for Peers {
    fn send(&mut self, token: Token, message: &[u8]) -> io::Result<()> {
        let peer = self
            .peers
            .get_mut(&token)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "unknown peer"))?;

        let was_pending = peer.has_pending();
        peer.send(message)?;
        if peer.has_pending() != was_pending {
            self.backlog_changed.push(token);
        }
        Ok(())
    }

    fn close(&mut self, token: Token) {
        let Some(mut peer) = self.peers.remove(&token) else {
            return;
        };

        if let Err(e) = self.registry.deregister(peer.stream_mut()) {
            tracing::debug!(token = token.0, error = %e, "deregister failed");
        }
        tracing::debug!(token = token.0, peer = %peer.addr(), "socket closed");
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr};

    use proptest::prelude::*;

    use super::*;

    /// Socket stand-in that accepts at most `budget` bytes before blocking.
    #[derive(Default)]
    struct Throttled {
        written: Vec<u8>,
        budget: usize,
        chunk: usize,
        broken: bool,
    }

    impl Read for Throttled {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::ErrorKind::WouldBlock.into())
        }
    }

    impl Write for Throttled {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.broken {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            if self.budget == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(self.budget).min(self.chunk.max(1));
            self.written.extend_from_slice(&buf[..n]);
            self.budget -= n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn addr() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 4000))
    }

    #[test]
    fn unblocked_send_writes_everything() {
        let stream = Throttled { budget: 1024, chunk: 1024, ..Default::default() };
        let mut peer = Peer::new(stream, addr(), 64);

        peer.send(b"hello").unwrap();

        assert!(!peer.has_pending());
        assert_eq!(peer.stream_mut().written, b"hello");
    }

    #[test]
    fn blocked_remainder_is_queued_then_flushed() {
        let stream = Throttled { budget: 2, chunk: 8, ..Default::default() };
        let mut peer = Peer::new(stream, addr(), 64);

        peer.send(b"hello").unwrap();
        assert!(peer.has_pending());
        assert_eq!(peer.stream_mut().written, b"he");

        peer.stream_mut().budget = 100;
        peer.flush().unwrap();
        assert!(!peer.has_pending());
        assert_eq!(peer.stream_mut().written, b"hello");
    }

    #[test]
    fn outbox_overflow_fails_send() {
        let stream = Throttled { budget: 0, chunk: 8, ..Default::default() };
        let mut peer = Peer::new(stream, addr(), 8);

        peer.send(b"12345").unwrap();
        let err = peer.send(b"6789").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn broken_socket_fails_send() {
        let stream = Throttled { budget: 10, chunk: 8, broken: true, ..Default::default() };
        let mut peer = Peer::new(stream, addr(), 64);

        assert_eq!(peer.send(b"x").unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    }

    proptest! {
        /// Whatever the socket's pacing, bytes come out in send order.
        #[test]
        fn prop_outbox_preserves_order(
            messages in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..32), 1..16),
            chunk in 1usize..16,
            budgets in prop::collection::vec(0usize..40, 1..16),
        ) {
            let stream = Throttled { budget: budgets[0], chunk, ..Default::default() };
            let mut peer = Peer::new(stream, addr(), 4096);

            for (i, message) in messages.iter().enumerate() {
                peer.send(message).unwrap();
                peer.stream_mut().budget += budgets[i % budgets.len()];
                peer.flush().unwrap();
            }
            peer.stream_mut().budget = usize::MAX;
            peer.flush().unwrap();

            let expected: Vec<u8> = messages.concat();
            prop_assert!(!peer.has_pending());
            prop_assert_eq!(&peer.stream_mut().written, &expected);
        }
    }
}
