//! Handler registry - fixed-capacity table of handler slots
//!
//! Storage is allocated once by [`Registry::initialize`] and never resized.
//! A slot is either empty or holds a handler together with its restrict
//! flag; the `Option` makes partially populated slots unrepresentable.

use std::fmt;

use contracts::{SharedHandler, Target};

use crate::error::DispatchError;

/// One populated registry entry
#[derive(Clone)]
pub struct Slot {
    handler: SharedHandler,
    restrict_to_index: bool,
}

impl Slot {
    pub fn handler(&self) -> &SharedHandler {
        &self.handler
    }

    /// Only targeted calls with this slot's index (or broadcasts) reach it
    pub fn restrict_to_index(&self) -> bool {
        self.restrict_to_index
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("handler", &self.handler.name())
            .field("restrict_to_index", &self.restrict_to_index)
            .finish()
    }
}

/// Fixed-capacity handler table
#[derive(Debug, Default)]
pub struct Registry {
    slots: Box<[Option<Slot>]>,
}

impl Registry {
    /// Create an uninitialized registry (no storage)
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `capacity` empty slots
    ///
    /// # Errors
    /// - `AlreadyInitialized` on a second call
    /// - `InvalidArgument` for a zero capacity
    pub fn initialize(&mut self, capacity: usize) -> Result<(), DispatchError> {
        if self.is_initialized() {
            return Err(DispatchError::AlreadyInitialized);
        }
        if capacity == 0 {
            return Err(DispatchError::InvalidArgument("handler capacity must be > 0"));
        }
        self.slots = (0..capacity).map(|_| None).collect();
        Ok(())
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        !self.slots.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of populated slots
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_occupied(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Store a handler in the lowest free slot and return its index
    ///
    /// # Errors
    /// - `NotInitialized` before [`Registry::initialize`]
    /// - `NoFreeSlot` when every slot is occupied
    pub fn register(
        &mut self,
        handler: SharedHandler,
        restrict_to_index: bool,
    ) -> Result<usize, DispatchError> {
        if !self.is_initialized() {
            return Err(DispatchError::NotInitialized);
        }
        let capacity = self.capacity();
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
            .ok_or(DispatchError::NoFreeSlot { capacity })?;
        *slot = Some(Slot {
            handler,
            restrict_to_index,
        });
        Ok(index)
    }

    /// Empty one slot; returns the handler that occupied it
    pub fn unregister(&mut self, index: usize) -> Result<Option<SharedHandler>, DispatchError> {
        if !self.is_initialized() {
            return Err(DispatchError::NotInitialized);
        }
        let capacity = self.capacity();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(DispatchError::IndexOutOfRange { index, capacity })?;
        Ok(slot.take().map(|s| s.handler))
    }

    /// Reset every slot to empty
    pub fn clear(&mut self) -> Result<(), DispatchError> {
        if !self.is_initialized() {
            return Err(DispatchError::NotInitialized);
        }
        self.slots.iter_mut().for_each(|slot| *slot = None);
        Ok(())
    }

    /// Occupied slots selected by `target`, in index order
    pub fn matching(&self, target: Target) -> impl Iterator<Item = (usize, &Slot)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|s| (i, s)))
            .filter(move |(i, s)| target.selects(*i, s.restrict_to_index))
    }
}
