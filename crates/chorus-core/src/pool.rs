//! Bounded client registry.
//!
//! The pool is a fixed array of slots allocated once at startup. Each slot is
//! either free or bound to exactly one connection handle. Allocation always
//! takes the lowest free slot, so a slot vacated by a disconnect is the next
//! one handed out.
//!
//! The pool is not synchronized. It is owned by the event loop and passed by
//! reference to the broadcast and disconnect handlers, all of which run on the
//! loop's thread.
//!
//! # Invariants
//!
//! - Occupancy never exceeds capacity.
//! - A handle occupies at most one slot.
//! - A freed slot carries no handle, no name and an empty interest mask.

use std::fmt;

use crate::{error::PoolError, interest::Interest};

/// One fixed position in the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSlot<H> {
    /// Connection handle, `None` while the slot is free
    handle: Option<H>,
    /// Optional label (peer address for relayed connections)
    name: Option<String>,
    /// Readiness the slot's descriptor is registered for
    interest: Interest,
    /// Whether the slot is occupied
    connected: bool,
}

impl<H: Copy> ClientSlot<H> {
    fn free() -> Self {
        Self { handle: None, name: None, interest: Interest::NONE, connected: false }
    }

    /// Handle bound to this slot. `None` if the slot is free.
    pub fn handle(&self) -> Option<H> {
        self.handle
    }

    /// Label of the connection. `None` if unset or the slot is free.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Interest mask of the slot's descriptor.
    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// Whether the slot is occupied.
    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Fixed-capacity registry mapping slot positions to connections.
///
/// `H` is the connection handle. The server uses its poll token; tests use
/// plain integers.
#[derive(Debug, Clone)]
pub struct ClientPool<H> {
    slots: Vec<ClientSlot<H>>,
    occupied: usize,
}

impl<H> ClientPool<H>
where
    H: Copy + Eq + fmt::Debug,
{
    /// Create a pool with `capacity` free slots.
    ///
    /// Fails if `capacity` is zero or the slot array cannot be allocated.
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }

        let mut slots = Vec::new();
        slots.try_reserve_exact(capacity).map_err(|_| PoolError::Allocation { capacity })?;
        slots.extend((0..capacity).map(|_| ClientSlot::free()));

        Ok(Self { slots, occupied: 0 })
    }

    /// Bind `handle` to the first free slot.
    ///
    /// Returns the handle on success. A full pool or an already registered
    /// handle is rejected without touching any slot; the caller owns the
    /// connection and must close it.
    pub fn add(&mut self, handle: H, interest: Interest) -> Result<H, PoolError> {
        let capacity = self.capacity();
        if self.occupied >= capacity {
            return Err(PoolError::Full { capacity });
        }

        if self.contains(handle) {
            return Err(PoolError::DuplicateHandle);
        }

        let Some((index, slot)) = self.slots.iter_mut().enumerate().find(|(_, s)| !s.connected)
        else {
            return Err(PoolError::Full { capacity });
        };

        slot.handle = Some(handle);
        slot.interest = interest;
        slot.connected = true;
        self.occupied += 1;

        tracing::debug!(slot = index, ?handle, occupied = self.occupied, "client added");
        Ok(handle)
    }

    /// Free the slot bound to `handle`.
    ///
    /// Returns the removed handle. Removing from an empty pool or removing a
    /// handle that is not registered fails without mutation, so a double
    /// remove after a disconnect race is harmless.
    pub fn remove(&mut self, handle: H) -> Result<H, PoolError> {
        if self.occupied == 0 {
            return Err(PoolError::Empty);
        }

        let index = self.slot_of(handle).ok_or(PoolError::NotFound)?;
        self.slots[index] = ClientSlot::free();
        self.occupied -= 1;

        tracing::debug!(slot = index, ?handle, occupied = self.occupied, "client removed");
        Ok(handle)
    }

    /// Tear the pool down, returning every handle that was still registered
    /// in slot order so the caller can close them.
    pub fn destroy(mut self) -> Vec<H> {
        let handles: Vec<H> = self.slots.iter().filter_map(|s| s.handle).collect();
        self.slots.clear();
        self.occupied = 0;

        tracing::debug!(released = handles.len(), "client pool destroyed");
        handles
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.occupied
    }

    /// Whether no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Whether every slot is occupied.
    pub fn is_full(&self) -> bool {
        self.occupied >= self.slots.len()
    }

    /// Whether `handle` occupies a slot.
    pub fn contains(&self, handle: H) -> bool {
        self.slot_of(handle).is_some()
    }

    /// Index of the slot bound to `handle`.
    pub fn slot_of(&self, handle: H) -> Option<usize> {
        self.slots.iter().position(|s| s.connected && s.handle == Some(handle))
    }

    /// Slot at `index`. `None` if out of range.
    pub fn slot(&self, index: usize) -> Option<&ClientSlot<H>> {
        self.slots.get(index)
    }

    /// Handle bound to the slot at `index`. `None` if free or out of range.
    pub fn handle_at(&self, index: usize) -> Option<H> {
        self.slots.get(index).and_then(ClientSlot::handle)
    }

    /// Occupied slots in scan order as `(slot index, handle)`.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, H)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| s.handle.map(|h| (i, h)))
    }

    /// Label the connection bound to `handle`.
    pub fn set_name(&mut self, handle: H, name: impl Into<String>) -> Result<(), PoolError> {
        let index = self.slot_of(handle).ok_or(PoolError::NotFound)?;
        self.slots[index].name = Some(name.into());
        Ok(())
    }

    /// Label of the connection bound to `handle`.
    pub fn name(&self, handle: H) -> Option<&str> {
        self.slot_of(handle).and_then(|i| self.slots[i].name())
    }

    /// Replace the interest mask of `handle`, returning the previous one.
    pub fn set_interest(&mut self, handle: H, interest: Interest) -> Result<Interest, PoolError> {
        let index = self.slot_of(handle).ok_or(PoolError::NotFound)?;
        Ok(std::mem::replace(&mut self.slots[index].interest, interest))
    }

    /// Interest mask of `handle`.
    pub fn interest(&self, handle: H) -> Option<Interest> {
        self.slot_of(handle).map(|i| self.slots[i].interest)
    }
}
