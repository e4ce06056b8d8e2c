//! Single-threaded readiness loop.
//!
//! One thread blocks in [`Poll::poll`] and dispatches every ready event before
//! waiting again:
//!
//! ```text
//!        ┌──────────────────────────────────────────────┐
//!        v                                              │
//!   ┌─────────┐  listener ready   ┌────────────────┐    │
//!   │  Wait   │──────────────────>│ accept + admit │────┤
//!   └─────────┘                   └────────────────┘    │
//!     │     │    peer readable    ┌────────────────┐    │
//!     │     └────────────────────>│ read → relay   │────┤
//!     │                           │   or disconnect│    │
//!     │                           └────────────────┘    │
//!     │ waker (shutdown)                                │
//!     v                                                 │
//!   closed                 peer writable → flush ───────┘
//! ```
//!
//! mio is edge-triggered, so the accept path drains the listener until it
//! would block. Reads are budgeted: a peer still readable after
//! [`READS_PER_TURN`] reads is queued and resumed after the next (zero-timeout)
//! wait, so one flooding peer cannot starve accepts, other peers or shutdown.
//! Nothing in a handler blocks: peer sockets are non-blocking and unsent bytes
//! wait in the peer's outbox.

use std::{
    collections::VecDeque,
    io::{self, Write},
    net::SocketAddr,
    time::{Duration, Instant},
};

use chorus_core::{
    ClientPool, Interest, PeerIo, PoolError, SendFailurePolicy, broadcast, disconnect,
};
use mio::{Events, Poll, Token, net::TcpListener};

use crate::{
    config::{IdlePolicy, RelayConfig},
    error::RelayError,
    listener::bind_listener,
    peer::{Peer, Peers},
    shutdown::ShutdownHandle,
};

/// Token of the listening socket (also its pool handle).
const LISTENER: Token = Token(0);

/// Token of the shutdown waker. Never stored in the pool.
const WAKER: Token = Token(usize::MAX);

/// Reads from one peer before yielding to the rest of the loop.
const READS_PER_TURN: usize = 16;

/// Readiness reported for one token.
#[derive(Debug, Clone, Copy)]
struct Ready {
    token: Token,
    readable: bool,
    writable: bool,
}

/// The relay: listener, client pool and connected peers driven by one poller.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    pool: ClientPool<Token>,
    peers: Peers,
    buffer: Vec<u8>,
    config: RelayConfig,
    next_token: usize,
    shutdown: ShutdownHandle,
    /// Peers that used up their read budget with bytes left, in service order
    unfinished: VecDeque<Token>,
}

impl EventLoop {
    /// Validate `config`, bind the listener and register it in a fresh pool.
    pub fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;

        let mut pool = ClientPool::new(config.capacity)?;
        let mut listener = bind_listener(config.bind_address, config.port, config.backlog)?;

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, mio::Interest::READABLE)
            .map_err(RelayError::Register)?;
        pool.add(LISTENER, Interest::READABLE)?;

        let shutdown = ShutdownHandle::new(poll.registry(), WAKER)?;
        let peers = Peers::new(poll.registry().try_clone()?);

        Ok(Self {
            events: Events::with_capacity(config.events_capacity),
            buffer: vec![0; config.buffer_size],
            poll,
            listener,
            pool,
            peers,
            config,
            next_token: LISTENER.0 + 1,
            shutdown,
            unfinished: VecDeque::new(),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle that stops [`run`](Self::run) from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serve until shutdown is requested or the readiness wait fails.
    ///
    /// Every peer and the listener are closed before returning.
    pub fn run(mut self) -> Result<(), RelayError> {
        tracing::info!(
            capacity = self.pool.capacity(),
            max_peers = self.config.max_peers(),
            buffer = self.buffer.len(),
            idle_timeout = ?self.config.idle_timeout,
            "relay running"
        );

        let mut last_activity = Instant::now();
        let result = loop {
            let timeout = if self.unfinished.is_empty() {
                self.config.idle_timeout
            } else {
                Some(Duration::ZERO)
            };
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => {},
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!(error = %e, "readiness wait failed");
                    break Err(RelayError::Poll(e));
                },
            }

            if self.events.is_empty() && self.unfinished.is_empty() {
                let Some(timeout) = self.config.idle_timeout else {
                    continue;
                };
                if last_activity.elapsed() < timeout {
                    continue;
                }
                match self.config.idle_policy {
                    IdlePolicy::KeepWaiting => {
                        tracing::info!(?timeout, peers = self.peers.len(), "idle, still waiting");
                        last_activity = Instant::now();
                        continue;
                    },
                    IdlePolicy::Exit => {
                        tracing::error!(?timeout, "idle timeout reached");
                        break Err(RelayError::IdleTimeout(timeout));
                    },
                }
            }
            last_activity = Instant::now();

            let ready: Vec<Ready> = self
                .events
                .iter()
                .map(|e| Ready {
                    token: e.token(),
                    readable: e.is_readable() || e.is_read_closed() || e.is_error(),
                    writable: e.is_writable(),
                })
                .collect();

            if self.dispatch(&ready) {
                break Ok(());
            }
            self.resume_unfinished();
        };

        self.close();
        result
    }

    /// Handle one batch of events. Returns true when shutdown was requested.
    fn dispatch(&mut self, ready: &[Ready]) -> bool {
        for event in ready {
            match event.token {
                WAKER => {
                    if self.shutdown.is_requested() {
                        tracing::info!("shutdown requested");
                        return true;
                    }
                },
                LISTENER => self.accept_pending(),
                token => {
                    if event.writable {
                        self.flush_peer(token);
                    }
                    if event.readable && !self.unfinished.contains(&token) {
                        self.read_peer(token);
                    }
                },
            }
            self.sync_interests();
        }
        false
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => self.admit(stream, addr),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    return;
                },
            }
        }
    }

    fn admit(&mut self, mut stream: mio::net::TcpStream, addr: SocketAddr) {
        let token = self.allocate_token();

        match self.pool.add(token, Interest::READABLE) {
            Ok(_) => {},
            Err(PoolError::Full { capacity }) => {
                tracing::warn!(peer = %addr, capacity, "relay full, connection refused");
                if let Some(refusal) = &self.config.refusal
                    && let Err(e) = stream.write_all(refusal.as_bytes())
                {
                    tracing::debug!(peer = %addr, error = %e, "refusal not delivered");
                }
                return;
            },
            Err(e) => {
                tracing::error!(peer = %addr, token = token.0, error = %e, "connection not admitted");
                return;
            },
        }

        let peer = Peer::new(stream, addr, self.config.outbox_limit);
        if let Err(e) = self.peers.insert(token, peer) {
            tracing::warn!(peer = %addr, error = %e, "failed to register connection");
            if let Err(e) = self.pool.remove(token) {
                tracing::warn!(token = token.0, error = %e, "failed to release slot");
            }
            return;
        }
        if let Err(e) = self.pool.set_name(token, addr.to_string()) {
            tracing::debug!(token = token.0, error = %e, "failed to name slot");
        }

        tracing::info!(token = token.0, peer = %addr, occupied = self.pool.len(), "new connection");

        let greeted = match self.config.welcome.as_deref() {
            Some(welcome) => self.peers.send(token, welcome.as_bytes()),
            None => Ok(()),
        };
        if let Err(e) = greeted {
            tracing::warn!(peer = %addr, error = %e, "welcome failed");
            self.drop_peer(token);
        }
    }

    /// Read and relay up to [`READS_PER_TURN`] messages from `token`.
    ///
    /// A peer that still has bytes once the budget is spent goes to the back
    /// of the unfinished queue.
    fn read_peer(&mut self, token: Token) {
        for _ in 0..READS_PER_TURN {
            let Some(peer) = self.peers.get_mut(token) else {
                return;
            };

            match peer.read(&mut self.buffer) {
                Ok(0) => {
                    tracing::info!(token = token.0, peer = ?self.pool.name(token), "hung up");
                    self.drop_peer(token);
                    return;
                },
                Ok(n) => self.relay(token, n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => {
                    tracing::warn!(token = token.0, error = %e, "read failed");
                    self.drop_peer(token);
                    return;
                },
            }
        }

        // The relay may have dropped the sender itself.
        if self.pool.contains(token) {
            self.unfinished.push_back(token);
        }
    }

    /// Give every peer queued at the start of the call one more read turn.
    fn resume_unfinished(&mut self) {
        for _ in 0..self.unfinished.len() {
            let Some(token) = self.unfinished.pop_front() else {
                break;
            };
            self.read_peer(token);
            self.sync_interests();
        }
    }

    /// Fan the first `len` bytes of the read buffer out from `sender`.
    fn relay(&mut self, sender: Token, len: usize) {
        let report = broadcast(&self.pool, sender, LISTENER, &self.buffer[..len], &mut self.peers);

        for (target, error) in report.failed {
            match self.config.send_failure {
                SendFailurePolicy::Disconnect => {
                    tracing::warn!(token = target.0, error = %error, "dropping unwritable peer");
                    self.drop_peer(target);
                },
                SendFailurePolicy::Skip => {},
            }
        }
    }

    fn flush_peer(&mut self, token: Token) {
        if let Err(e) = self.peers.flush(token) {
            tracing::warn!(token = token.0, error = %e, "flush failed");
            self.drop_peer(token);
        }
    }

    /// Close the peer's socket and reclaim its slot.
    fn drop_peer(&mut self, token: Token) {
        let Some(slot) = self.pool.slot_of(token) else {
            self.peers.close(token);
            return;
        };

        match disconnect(&mut self.pool, slot, &mut self.peers) {
            Ok(_) => {},
            Err(e) if e.is_recoverable() => {
                tracing::debug!(token = token.0, error = %e, "client already removed");
            },
            Err(e) => tracing::error!(token = token.0, error = %e, "client removal failed"),
        }
    }

    /// Match poll interest to outbox state for peers whose backlog changed.
    fn sync_interests(&mut self) {
        for token in self.peers.take_backlog_changes() {
            let Some(pending) = self.peers.has_pending(token) else {
                continue;
            };

            let wanted =
                if pending { Interest::READABLE | Interest::WRITABLE } else { Interest::READABLE };
            if self.pool.interest(token) == Some(wanted) {
                continue;
            }

            match self.peers.reregister(token, to_mio(wanted)) {
                Ok(()) => {
                    if let Err(e) = self.pool.set_interest(token, wanted) {
                        tracing::debug!(token = token.0, error = %e, "interest not recorded");
                    }
                },
                Err(e) => {
                    tracing::warn!(token = token.0, error = %e, "reregister failed");
                    self.drop_peer(token);
                },
            }
        }
    }

    fn allocate_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        if self.next_token == WAKER.0 {
            self.next_token = LISTENER.0 + 1;
        }
        token
    }

    /// Close every peer, then the listener.
    fn close(self) {
        let Self { pool, mut peers, listener, .. } = self;

        for handle in pool.destroy() {
            if handle != LISTENER {
                peers.close(handle);
            }
        }
        drop(listener);

        tracing::info!("relay closed");
    }
}

fn to_mio(interest: Interest) -> mio::Interest {
    match (interest.is_readable(), interest.is_writable()) {
        (_, false) => mio::Interest::READABLE,
        (false, true) => mio::Interest::WRITABLE,
        (true, true) => mio::Interest::READABLE | mio::Interest::WRITABLE,
    }
}
