//! Chorus relay core.
//!
//! I/O-free logic of the fan-out relay: the bounded client registry, the
//! broadcast router and the disconnect handler. Nothing here touches a socket;
//! real I/O happens behind the [`PeerIo`] trait, which the server implements
//! over non-blocking TCP streams and tests implement in memory.
//!
//! # Components
//!
//! - [`ClientPool`]: fixed-capacity slot registry
//! - [`broadcast`]: send one message to every peer but the sender
//! - [`disconnect`]: close a slot's connection and reclaim the slot
//! - [`PeerIo`]: the seam to the transport

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod broadcast;
mod disconnect;
mod error;
mod interest;
mod peer_io;
mod pool;

pub use broadcast::{BroadcastReport, SendFailurePolicy, broadcast};
pub use disconnect::disconnect;
pub use error::PoolError;
pub use interest::Interest;
pub use peer_io::PeerIo;
pub use pool::{ClientPool, ClientSlot};
