//! Relay configuration.

use std::{net::IpAddr, time::Duration};

use chorus_core::SendFailurePolicy;

use crate::error::ConfigError;

/// Port used when none is given.
pub const DEFAULT_PORT: u16 = 9001;

/// Pool slots, the listener's included.
pub const DEFAULT_CAPACITY: usize = 16;

/// Bytes read per readiness-triggered read; one read is one message.
pub const DEFAULT_BUFFER_SIZE: usize = 256;

/// Kernel queue depth for pending connections.
pub const DEFAULT_BACKLOG: i32 = 10;

/// Time without any readiness event before the idle policy applies.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Bytes queued for a slow peer before sends to it start failing.
pub const DEFAULT_OUTBOX_LIMIT: usize = 64 * 1024;

/// Events drained per readiness wait.
pub const DEFAULT_EVENTS_CAPACITY: usize = 128;

/// Text sent to a peer when it is admitted.
pub const DEFAULT_WELCOME: &str = "welcome to chorus\n";

/// Text sent to a peer turned away because the pool is full.
pub const DEFAULT_REFUSAL: &str = "chorus is full, try again later\n";

/// What the loop does when the readiness wait times out with no events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdlePolicy {
    /// Log and keep waiting.
    #[default]
    KeepWaiting,
    /// Stop the relay with [`RelayError::IdleTimeout`](crate::RelayError).
    Exit,
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind. `None` binds the wildcard of both families.
    pub bind_address: Option<IpAddr>,
    /// TCP port (0 lets the OS choose)
    pub port: u16,
    /// Pool slots, including the listener's
    pub capacity: usize,
    /// Read buffer size, and so the largest single message
    pub buffer_size: usize,
    /// Listen backlog
    pub backlog: i32,
    /// Readiness wait timeout. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Behavior on idle timeout
    pub idle_policy: IdlePolicy,
    /// Behavior when a send to one peer fails
    pub send_failure: SendFailurePolicy,
    /// Per-peer cap on queued outbound bytes
    pub outbox_limit: usize,
    /// Events drained per readiness wait
    pub events_capacity: usize,
    /// Sent to every admitted peer
    pub welcome: Option<String>,
    /// Sent to peers refused because the pool is full
    pub refusal: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: None,
            port: DEFAULT_PORT,
            capacity: DEFAULT_CAPACITY,
            buffer_size: DEFAULT_BUFFER_SIZE,
            backlog: DEFAULT_BACKLOG,
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            idle_policy: IdlePolicy::default(),
            send_failure: SendFailurePolicy::default(),
            outbox_limit: DEFAULT_OUTBOX_LIMIT,
            events_capacity: DEFAULT_EVENTS_CAPACITY,
            welcome: Some(DEFAULT_WELCOME.to_string()),
            refusal: Some(DEFAULT_REFUSAL.to_string()),
        }
    }
}

impl RelayConfig {
    /// Check that the values can run a relay.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity < 2 {
            return Err(ConfigError::CapacityTooSmall(self.capacity));
        }
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.backlog <= 0 {
            return Err(ConfigError::InvalidBacklog(self.backlog));
        }
        if self.outbox_limit < self.buffer_size {
            return Err(ConfigError::OutboxTooSmall {
                limit: self.outbox_limit,
                buffer: self.buffer_size,
            });
        }
        if self.events_capacity == 0 {
            return Err(ConfigError::ZeroEventsCapacity);
        }
        Ok(())
    }

    /// Largest number of peers served at once (the listener holds one slot).
    pub fn max_peers(&self) -> usize {
        self.capacity.saturating_sub(1)
    }
}
