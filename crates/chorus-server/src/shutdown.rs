//! Shutdown signalling.
//!
//! The event loop blocks in the readiness wait, so stopping it takes two
//! steps: set the request flag, then wake the poller through its
//! [`mio::Waker`]. The loop checks the flag when the waker's token fires.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use mio::{Registry, Token, Waker};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};

use crate::error::RelayError;

/// Cloneable handle that stops a running [`EventLoop`](crate::EventLoop).
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    waker: Arc<Waker>,
    requested: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub(crate) fn new(registry: &Registry, token: Token) -> io::Result<Self> {
        Ok(Self {
            waker: Arc::new(Waker::new(registry, token)?),
            requested: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Ask the loop to stop and wake it. Safe to call from any thread, any
    /// number of times.
    pub fn shutdown(&self) -> io::Result<()> {
        self.requested.store(true, Ordering::SeqCst);
        self.waker.wake()
    }

    /// Whether shutdown was requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Trigger `handle` on the first SIGINT or SIGTERM.
///
/// Signals are consumed on a dedicated thread, which does nothing but call
/// [`ShutdownHandle::shutdown`].
pub fn install_signal_handler(handle: ShutdownHandle) -> Result<thread::JoinHandle<()>, RelayError> {
    let mut signals = Signals::new([SIGINT, SIGTERM]).map_err(RelayError::Signal)?;

    thread::Builder::new()
        .name("chorus-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                tracing::info!(signal, "shutdown signal received");
                if let Err(e) = handle.shutdown() {
                    tracing::error!(error = %e, "failed to wake event loop");
                }
            }
        })
        .map_err(RelayError::Signal)
}
