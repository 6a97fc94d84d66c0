//! Dispatcher error types
//!
//! Every variant is local and recoverable: the dispatcher keeps running and
//! the caller decides whether to retry.

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Operation attempted before the registry was initialized
    #[error("dispatcher is not initialized")]
    NotInitialized,

    /// Registry initialization attempted twice
    #[error("registry is already initialized")]
    AlreadyInitialized,

    /// Every handler slot is occupied
    #[error("no free handler slot (capacity {capacity})")]
    NoFreeSlot { capacity: usize },

    /// Dispatch queue full - call dropped
    #[error("dispatch queue full, call for ring slot {ring_slot} dropped")]
    Dropped { ring_slot: usize },

    /// Payload length does not match the element size
    #[error("payload is {actual} bytes, expected {expected}")]
    PayloadSize { expected: usize, actual: usize },

    /// Slot index outside the registry or ring
    #[error("index {index} out of range (capacity {capacity})")]
    IndexOutOfRange { index: usize, capacity: usize },

    /// Zero capacity or similar construction argument error
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Worker stopped, queue closed
    #[error("dispatcher is stopped")]
    Closed,

    /// Worker thread could not be spawned
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl DispatchError {
    /// Whether the call was rejected because of backpressure
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped { .. })
    }
}
