//! I/O seam between the relay logic and real sockets.

use std::io;

/// Delivers bytes to, and closes, the connection behind a handle.
///
/// The server implements this over non-blocking sockets; tests implement it
/// with an in-memory recorder.
pub trait PeerIo<H> {
    /// Hand `message` to the connection behind `handle`.
    ///
    /// Must not block. An `Err` means the peer cannot be written to any more.
    fn send(&mut self, handle: H, message: &[u8]) -> io::Result<()>;

    /// Close the connection behind `handle`. Closing an unknown handle is a
    /// no-op.
    fn close(&mut self, handle: H);
}
