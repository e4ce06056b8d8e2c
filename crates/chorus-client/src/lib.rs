//! Chorus client.
//!
//! A line-oriented client for the Chorus relay. Everything the relay sends
//! (the welcome text, then every message from other peers) is copied to an
//! output writer unchanged; every line read from the input is sent to the
//! relay, optionally prefixed with a display name.
//!
//! The relay has no framing, so neither does the client: a "message" is
//! simply a line with its trailing newline.
//!
//! # Components
//!
//! - [`connect`]: dial the relay
//! - [`Session`]: pump relay output and user input until either side ends
//! - [`outbound`]: turn one input line into bytes to send, or a quit

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod session;

pub use error::ClientError;
pub use session::{DEFAULT_HOST, DEFAULT_PORT, Outbound, Session, connect, outbound};
