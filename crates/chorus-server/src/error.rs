//! Server error types.
//!
//! Every [`RelayError`] that reaches the binary is fatal: startup failures
//! (configuration, pool allocation, bind/listen) and runtime failures of the
//! readiness wait itself. Failures scoped to one peer never surface here; the
//! event loop logs them and keeps serving everyone else.

use std::{io, net::SocketAddr, time::Duration};

use chorus_core::PoolError;
use thiserror::Error;

/// Rejected configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The pool needs room for the listener and at least one peer.
    #[error("capacity must be at least 2 (listener + one peer), got {0}")]
    CapacityTooSmall(usize),

    /// Reads need a non-empty buffer.
    #[error("buffer size must be non-zero")]
    ZeroBufferSize,

    /// The kernel backlog must be positive.
    #[error("backlog must be positive, got {0}")]
    InvalidBacklog(i32),

    /// The outbox must hold at least one full message.
    #[error("outbox limit ({limit}) is smaller than the read buffer ({buffer})")]
    OutboxTooSmall {
        /// Configured outbox limit in bytes
        limit: usize,
        /// Configured read buffer size in bytes
        buffer: usize,
    },

    /// The poll event buffer must hold at least one event.
    #[error("events capacity must be non-zero")]
    ZeroEventsCapacity,
}

/// Fatal relay errors.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The client pool could not be created or the listener registered.
    #[error("client pool error: {0}")]
    Pool(#[from] PoolError),

    /// No candidate address could be bound.
    #[error("failed to bind any address for port {port}: {source}")]
    Bind {
        /// Requested port
        port: u16,
        /// Error from the last candidate tried
        #[source]
        source: io::Error,
    },

    /// The bound socket could not enter the listening state.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        /// Address the socket was bound to
        addr: SocketAddr,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A descriptor could not be registered with the poller.
    #[error("failed to register with poller: {0}")]
    Register(#[source] io::Error),

    /// The readiness wait itself failed.
    #[error("readiness wait failed: {0}")]
    Poll(#[source] io::Error),

    /// No readiness events within the idle timeout (with `IdlePolicy::Exit`).
    #[error("no readiness events for {0:?}")]
    IdleTimeout(Duration),

    /// Signal handling could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),

    /// Other I/O failure during startup.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
