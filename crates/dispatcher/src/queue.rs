//! Dispatch queue - bounded FIFO of dispatch records
//!
//! Backed by a bounded `async-channel`, which is safe for many producers and
//! one consumer without an external lock. Pushes never block; the worker's
//! pop blocks until a record arrives or the queue is closed.

use async_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use contracts::DispatchRecord;

use crate::error::DispatchError;

#[derive(Debug)]
pub struct DispatchQueue {
    tx: Sender<DispatchRecord>,
    rx: Receiver<DispatchRecord>,
    capacity: usize,
}

impl DispatchQueue {
    /// Create a queue holding at most `capacity` records
    pub fn new(capacity: usize) -> Result<Self, DispatchError> {
        if capacity == 0 {
            return Err(DispatchError::InvalidArgument("queue capacity must be > 0"));
        }
        let (tx, rx) = bounded(capacity);
        Ok(Self { tx, rx, capacity })
    }

    /// Enqueue without blocking
    ///
    /// # Errors
    /// - `Dropped` when the queue is at capacity (the record is discarded)
    /// - `Closed` after [`DispatchQueue::close`]
    pub fn try_push(&self, record: DispatchRecord) -> Result<(), DispatchError> {
        match self.tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(r)) => Err(DispatchError::Dropped {
                ring_slot: r.ring_slot,
            }),
            Err(TrySendError::Closed(_)) => Err(DispatchError::Closed),
        }
    }

    /// Block until a record is available
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop_blocking(&self) -> Option<DispatchRecord> {
        self.rx.recv_blocking().ok()
    }

    /// Pop without blocking
    pub fn try_pop(&self) -> Option<DispatchRecord> {
        match self.rx.try_recv() {
            Ok(record) => Some(record),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Close the queue; wakes a blocked pop. Returns false if already closed.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
