//! Chorus relay server.
//!
//! A TCP relay that accepts a bounded number of connections and fans every
//! inbound message out to all other connected peers. The protocol is the raw
//! byte stream: one read's worth of bytes is one message, with no framing.
//!
//! # Architecture
//!
//! This crate is the I/O "glue" around [`chorus_core`]. The core owns the
//! client pool and the broadcast/disconnect logic; this crate supplies real
//! sockets through [`chorus_core::PeerIo`] and drives everything from a single
//! mio readiness loop.
//!
//! # Components
//!
//! - [`bind_listener`]: dual-stack listening socket with address reuse
//! - [`EventLoop`]: the readiness loop (accept, read, relay, disconnect)
//! - [`ShutdownHandle`]: wakes and stops the loop from another thread
//! - [`RelayConfig`]: every tunable, with defaults

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod error;
mod event_loop;
mod listener;
mod peer;
mod shutdown;

pub use chorus_core::SendFailurePolicy;
pub use config::{
    DEFAULT_BACKLOG, DEFAULT_BUFFER_SIZE, DEFAULT_CAPACITY, DEFAULT_EVENTS_CAPACITY,
    DEFAULT_IDLE_TIMEOUT, DEFAULT_OUTBOX_LIMIT, DEFAULT_PORT, DEFAULT_REFUSAL, DEFAULT_WELCOME,
    IdlePolicy, RelayConfig,
};
pub use error::{ConfigError, RelayError};
pub use event_loop::EventLoop;
pub use listener::{bind_listener, candidate_addrs};
pub use shutdown::{ShutdownHandle, install_signal_handler};
