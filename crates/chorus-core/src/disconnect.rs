//! Slot reclamation on hang-up or error.

use std::fmt;

use crate::{error::PoolError, peer_io::PeerIo, pool::ClientPool};

/// Close the connection held by slot `index` and free the slot.
///
/// Returns the handle that was removed. A free or out-of-range slot yields
/// [`PoolError::NotFound`] and closes nothing, so callers must re-read the
/// slot rather than disconnect the same index twice.
pub fn disconnect<H, P>(pool: &mut ClientPool<H>, index: usize, io: &mut P) -> Result<H, PoolError>
where
    H: Copy + Eq + fmt::Debug,
    P: PeerIo<H>,
{
    let handle = pool.handle_at(index).ok_or(PoolError::NotFound)?;

    io.close(handle);
    let removed = pool.remove(handle)?;

    tracing::info!(slot = index, handle = ?removed, occupied = pool.len(), "client disconnected");
    Ok(removed)
}
