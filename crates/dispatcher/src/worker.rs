//! Worker - the single consumer thread of a dispatcher
//!
//! ```text
//!            pop ok                    all matching slots evaluated
//!   Idle ──────────────► Dispatching ──────────────────────────────► Idle
//!    │                        │
//!    └── queue closed ──► Stopped ◄── stop flag seen
//! ```

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use contracts::{DispatchRecord, Flow, SharedHandler};
use tracing::{debug, error, info, trace, warn};

use crate::dispatcher::Shared;

/// Observable worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Registry not initialized yet, no thread
    NotStarted = 0,
    /// Blocked on the dispatch queue
    Idle = 1,
    /// Running handlers for one record
    Dispatching = 2,
    /// Exited; terminal
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Idle,
            2 => WorkerState::Dispatching,
            3 => WorkerState::Stopped,
            _ => WorkerState::NotStarted,
        }
    }
}

/// Atomic cell holding a [`WorkerState`]
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(WorkerState::NotStarted as u8))
    }

    pub(crate) fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Spawn the worker thread with the configured name and stack size
pub(crate) fn spawn(shared: Arc<Shared>) -> io::Result<JoinHandle<()>> {
    let config = shared.config();
    let thread_name = config.worker_name();
    let stack_size = config.worker.stack_size;
    let priority_hint = config.worker.priority_hint;

    let handle = thread::Builder::new()
        .name(thread_name.clone())
        .stack_size(stack_size)
        .spawn(move || run(shared))?;

    // std has no portable priority control; the hint is only reported
    debug!(
        thread = %thread_name,
        stack_size,
        priority_hint,
        "Worker thread spawned"
    );
    Ok(handle)
}

/// Worker main loop
///
/// Scratch storage is sized once here; dispatching a record allocates nothing.
fn run(shared: Arc<Shared>) {
    let capacity = shared.handler_capacity();
    let mut payload = vec![0u8; shared.element_size()];
    let mut batch: Vec<(usize, SharedHandler)> = Vec::with_capacity(capacity);

    info!(dispatcher = %shared.name(), handlers = capacity, "Worker started");

    loop {
        shared.worker_state().set(WorkerState::Idle);

        let Some(record) = shared.queue().pop_blocking() else {
            break;
        };
        if shared.is_stopping() {
            debug!(
                dispatcher = %shared.name(),
                pending = shared.queue().len(),
                "Stop requested, discarding queued records"
            );
            break;
        }

        shared.worker_state().set(WorkerState::Dispatching);
        dispatch_record(&shared, record, &mut payload, &mut batch);
    }

    shared.worker_state().set(WorkerState::Stopped);
    info!(dispatcher = %shared.name(), "Worker stopped");
}

/// Run every matching handler for one record
///
/// The payload and the matching handlers are snapshotted under the guard,
/// then the guard is released so handlers may call back into any dispatcher.
fn dispatch_record(
    shared: &Shared,
    record: DispatchRecord,
    payload: &mut [u8],
    batch: &mut Vec<(usize, SharedHandler)>,
) {
    let started = Instant::now();

    if let Err(e) = shared.snapshot(record, payload, batch) {
        error!(
            dispatcher = %shared.name(),
            ring_slot = record.ring_slot,
            error = %e,
            "Failed to read payload for record"
        );
        return;
    }

    trace!(
        dispatcher = %shared.name(),
        target = %record.target,
        ring_slot = record.ring_slot,
        handlers = batch.len(),
        "Dispatching record"
    );

    for (index, handler) in batch.drain(..) {
        if shared.is_stopping() {
            break;
        }

        shared.metrics().inc_handler_invocations();
        let flow = match panic::catch_unwind(AssertUnwindSafe(|| handler.invoke(payload))) {
            Ok(flow) => flow,
            Err(_) => {
                error!(
                    dispatcher = %shared.name(),
                    slot = index,
                    handler = handler.name(),
                    "Handler panicked"
                );
                Flow::Stop
            }
        };

        if flow.is_propagate() {
            forward(shared, index, payload);
        }
    }

    shared.metrics().record_dispatched(
        started.elapsed().as_secs_f64() * 1_000_000.0,
        shared.queue().len(),
    );
}

/// Hand the payload to the parent dispatcher, once per propagating handler
fn forward(shared: &Shared, index: usize, payload: &[u8]) {
    let Some(parent) = shared.parent() else {
        trace!(dispatcher = %shared.name(), slot = index, "No parent linked, not forwarding");
        return;
    };

    match parent.call(payload, contracts::Target::Broadcast) {
        Ok(_) => shared.metrics().inc_propagated(),
        Err(e) => {
            shared.metrics().inc_forward_failures();
            warn!(
                dispatcher = %shared.name(),
                parent = %parent.name(),
                slot = index,
                error = %e,
                "Forward to parent failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_cell_roundtrip() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), WorkerState::NotStarted);
        for state in [
            WorkerState::Idle,
            WorkerState::Dispatching,
            WorkerState::Stopped,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }
}
