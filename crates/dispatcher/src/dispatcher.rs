//! Dispatcher - payload ring + dispatch queue + handler registry + worker
//!
//! Producers call [`Dispatcher::call`] from any thread. Under the guard the
//! payload is copied into the next ring slot and a record pointing at that
//! slot is queued, so the pair is never split by another producer. The worker
//! pops records in FIFO order and runs the matching handlers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use bytemuck::Pod;
use contracts::{
    ContextHandler, DispatchRecord, DispatcherConfig, Flow, FnHandler, MetricsSnapshot,
    SharedHandler, Target, WorkerConfig,
};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::DispatchError;
use crate::guard::Guard;
use crate::metrics::DispatcherMetrics;
use crate::queue::DispatchQueue;
use crate::registry::Registry;
use crate::ring::PayloadRing;
use crate::worker::{self, StateCell, WorkerState};

/// Storage mutated under the guard
#[derive(Debug)]
struct Core {
    registry: Registry,
    ring: PayloadRing,
}

/// State shared by the owning [`Dispatcher`], its worker and child links
pub(crate) struct Shared {
    config: DispatcherConfig,
    element_size: usize,
    core: Guard<Core>,
    queue: DispatchQueue,
    parent: Guard<Option<Weak<Shared>>>,
    metrics: DispatcherMetrics,
    stopping: AtomicBool,
    state: StateCell,
}

impl Shared {
    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub(crate) fn element_size(&self) -> usize {
        self.element_size
    }

    pub(crate) fn handler_capacity(&self) -> usize {
        self.core.acquire().registry.capacity()
    }

    pub(crate) fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    pub(crate) fn metrics(&self) -> &DispatcherMetrics {
        &self.metrics
    }

    pub(crate) fn worker_state(&self) -> &StateCell {
        &self.state
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Upgrade the parent link, if one is set and still alive
    pub(crate) fn parent(&self) -> Option<Arc<Shared>> {
        self.parent.acquire().as_ref().and_then(Weak::upgrade)
    }

    /// Producer entry point
    ///
    /// The payload is copied into the cursor slot and the record queued in
    /// one guard hold. The copy stays in the ring even when the queue is full,
    /// so the k-th call always lands in slot `(start + k) % ring_capacity`.
    pub(crate) fn call(&self, value: &[u8], target: Target) -> Result<usize, DispatchError> {
        if self.is_stopping() {
            debug!(dispatcher = %self.name(), "Call rejected, dispatcher stopped");
            return Err(DispatchError::Closed);
        }

        let mut core = self.core.acquire();
        if !core.registry.is_initialized() {
            debug!(dispatcher = %self.name(), "The object is not initialized");
            return Err(DispatchError::NotInitialized);
        }

        let ring_slot = core.ring.write(value).inspect_err(|e| {
            debug!(dispatcher = %self.name(), error = %e, "Call rejected");
        })?;

        match self.queue.try_push(DispatchRecord { target, ring_slot }) {
            Ok(()) => {
                self.metrics.inc_accepted(self.queue.len());
                trace!(dispatcher = %self.name(), %target, ring_slot, "Call queued");
                Ok(ring_slot)
            }
            Err(e) => {
                if e.is_dropped() {
                    self.metrics.inc_dropped();
                    warn!(
                        dispatcher = %self.name(),
                        %target,
                        ring_slot,
                        queue_capacity = self.queue.capacity(),
                        "Queue full, call dropped after payload write"
                    );
                } else {
                    debug!(dispatcher = %self.name(), error = %e, "Call rejected");
                }
                Err(e)
            }
        }
    }

    /// Copy a record's payload and the matching handlers out from under the guard
    pub(crate) fn snapshot(
        &self,
        record: DispatchRecord,
        payload: &mut [u8],
        batch: &mut Vec<(usize, SharedHandler)>,
    ) -> Result<(), DispatchError> {
        let core = self.core.acquire();
        core.ring.read_at(record.ring_slot, payload)?;
        batch.clear();
        batch.extend(
            core.registry
                .matching(record.target)
                .map(|(index, slot)| (index, Arc::clone(slot.handler()))),
        );
        Ok(())
    }
}

/// Event-callback dispatcher
///
/// Owns its registry, ring, queue and worker thread. Share it behind an
/// `Arc` to call it from several producer threads.
///
/// Dropping the dispatcher stops and joins the worker before the storage is
/// released.
pub struct Dispatcher {
    shared: Arc<Shared>,
    worker: Guard<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name())
            .field("ring_capacity", &self.ring_capacity())
            .field("element_size", &self.element_size())
            .field("worker_state", &self.worker_state())
            .finish()
    }
}

impl Dispatcher {
    /// Construct the ring and queue; the registry and worker start later
    ///
    /// # Errors
    /// `InvalidArgument` for a zero ring capacity, element size or queue capacity.
    #[instrument(
        name = "dispatcher_new",
        skip(config),
        fields(dispatcher = %config.name, ring_capacity = config.ring_capacity, element_size = config.element_size)
    )]
    pub fn new(config: DispatcherConfig) -> Result<Self, DispatchError> {
        let ring = PayloadRing::new(config.ring_capacity, config.element_size).map_err(|e| {
            error!(dispatcher = %config.name, error = %e, "Required parameters are missing");
            e
        })?;
        let queue = DispatchQueue::new(config.effective_queue_capacity())?;
        let metrics = DispatcherMetrics::new(&config.name);

        info!(
            dispatcher = %config.name,
            queue_capacity = queue.capacity(),
            "Dispatcher created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                element_size: config.element_size,
                config,
                core: Guard::new(Core {
                    registry: Registry::new(),
                    ring,
                }),
                queue,
                parent: Guard::new(None),
                metrics,
                stopping: AtomicBool::new(false),
                state: StateCell::new(),
            }),
            worker: Guard::new(None),
        })
    }

    /// Fluent construction
    pub fn builder(name: impl Into<String>) -> DispatcherBuilder {
        DispatcherBuilder::new(name)
    }

    /// Construct and initialize the registry with `config.max_handlers`
    pub fn start(config: DispatcherConfig) -> Result<Self, DispatchError> {
        let max_handlers = config.max_handlers;
        let dispatcher = Self::new(config)?;
        dispatcher.initialize_registry(max_handlers)?;
        Ok(dispatcher)
    }

    /// Allocate `max_handlers` slots and start the worker
    ///
    /// # Errors
    /// - `AlreadyInitialized` on a second call
    /// - `InvalidArgument` for zero
    /// - `Closed` after [`Dispatcher::stop`]
    /// - `Spawn` if the worker thread cannot be created (registry is rolled back)
    #[instrument(name = "dispatcher_initialize_registry", skip(self), fields(dispatcher = %self.name()))]
    pub fn initialize_registry(&self, max_handlers: usize) -> Result<(), DispatchError> {
        if self.shared.is_stopping() {
            return Err(DispatchError::Closed);
        }

        let mut core = self.shared.core.acquire();
        core.registry.initialize(max_handlers).map_err(|e| {
            debug!(dispatcher = %self.name(), error = %e, "Registry initialization refused");
            e
        })?;
        drop(core);

        match worker::spawn(Arc::clone(&self.shared)) {
            Ok(handle) => {
                *self.worker.acquire() = Some(handle);
                info!(dispatcher = %self.name(), max_handlers, "Registry initialized");
                Ok(())
            }
            Err(e) => {
                self.shared.core.acquire().registry = Registry::new();
                error!(dispatcher = %self.name(), error = %e, "Failed to start worker");
                Err(DispatchError::Spawn(e))
            }
        }
    }

    /// True once both the ring and the registry storage exist
    pub fn is_initialized(&self) -> bool {
        self.shared.core.acquire().registry.is_initialized()
    }

    /// Register a handler in the lowest free slot
    ///
    /// With `restrict_to_index` set, targeted calls reach the handler only when
    /// they name its slot index; broadcasts always reach it.
    pub fn register_handler(
        &self,
        handler: SharedHandler,
        restrict_to_index: bool,
    ) -> Result<usize, DispatchError> {
        let mut core = self.shared.core.acquire();
        let name = handler.name().to_string();
        match core.registry.register(handler, restrict_to_index) {
            Ok(index) => {
                observability::record_registered_handlers(self.name(), core.registry.occupied());
                debug!(
                    dispatcher = %self.name(),
                    handler = %name,
                    index,
                    restrict_to_index,
                    "Handler registered"
                );
                Ok(index)
            }
            Err(e) => {
                debug!(dispatcher = %self.name(), handler = %name, error = %e, "Handler not registered");
                Err(e)
            }
        }
    }

    /// Register a closure
    pub fn register_fn<F>(
        &self,
        name: impl Into<String>,
        func: F,
        restrict_to_index: bool,
    ) -> Result<usize, DispatchError>
    where
        F: Fn(&[u8]) -> Flow + Send + Sync + 'static,
    {
        self.register_handler(Arc::new(FnHandler::new(name, func)), restrict_to_index)
    }

    /// Register a function together with a shared context value
    pub fn register_with_context<C>(
        &self,
        name: impl Into<String>,
        func: fn(&[u8], &C) -> Flow,
        context: Arc<C>,
        restrict_to_index: bool,
    ) -> Result<usize, DispatchError>
    where
        C: Send + Sync + 'static,
    {
        self.register_handler(
            Arc::new(ContextHandler::new(name, func, context)),
            restrict_to_index,
        )
    }

    /// Empty one handler slot
    pub fn unregister_handler(&self, index: usize) -> Result<Option<SharedHandler>, DispatchError> {
        let mut core = self.shared.core.acquire();
        let removed = core.registry.unregister(index)?;
        observability::record_registered_handlers(self.name(), core.registry.occupied());
        debug!(dispatcher = %self.name(), index, removed = removed.is_some(), "Handler slot cleared");
        Ok(removed)
    }

    /// Reset every handler slot to empty
    pub fn clear_handlers(&self) -> Result<(), DispatchError> {
        let mut core = self.shared.core.acquire();
        core.registry.clear().map_err(|e| {
            debug!(dispatcher = %self.name(), "The object is not initialized");
            e
        })?;
        observability::record_registered_handlers(self.name(), 0);
        debug!(dispatcher = %self.name(), "Clearing all handler slots");
        Ok(())
    }

    /// Queue a payload for the worker; returns the ring slot it was written to
    ///
    /// `value` must be exactly `element_size` bytes.
    ///
    /// # Errors
    /// - `NotInitialized` before [`Dispatcher::initialize_registry`]
    /// - `PayloadSize` for a wrongly sized (or empty) payload
    /// - `Dropped` when the queue is full; nothing is retried
    /// - `Closed` after [`Dispatcher::stop`]
    pub fn call(&self, value: &[u8], target: Target) -> Result<usize, DispatchError> {
        self.shared.call(value, target)
    }

    /// [`Dispatcher::call`] with a broadcast target
    pub fn broadcast(&self, value: &[u8]) -> Result<usize, DispatchError> {
        self.shared.call(value, Target::Broadcast)
    }

    /// Queue a plain-old-data value
    pub fn call_pod<T: Pod>(&self, value: &T, target: Target) -> Result<usize, DispatchError> {
        self.shared.call(bytemuck::bytes_of(value), target)
    }

    /// Copy the most recently written payload into `out`
    ///
    /// Independent of handler execution and of the queue. Returns `Ok(false)`
    /// if nothing has been written yet.
    pub fn poll_last(&self, out: &mut [u8]) -> Result<bool, DispatchError> {
        let core = self.shared.core.acquire();
        match core.ring.last_written() {
            Some(slot) => {
                core.ring.read_at(slot, out)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// [`Dispatcher::poll_last`] decoded as a plain-old-data value
    pub fn poll_last_pod<T: Pod>(&self) -> Result<Option<T>, DispatchError> {
        let mut value = <T as bytemuck::Zeroable>::zeroed();
        let found = self.poll_last(bytemuck::bytes_of_mut(&mut value))?;
        Ok(found.then_some(value))
    }

    /// Link a parent that receives payloads of propagating handlers
    ///
    /// The link does not keep the parent alive. Callers must keep the graph of
    /// parent links acyclic; only a direct self-link is rejected.
    pub fn set_parent(&self, parent: &Dispatcher) -> Result<(), DispatchError> {
        if Arc::ptr_eq(&self.shared, &parent.shared) {
            return Err(DispatchError::InvalidArgument(
                "a dispatcher cannot be its own parent",
            ));
        }
        if parent.element_size() != self.element_size() {
            return Err(DispatchError::PayloadSize {
                expected: self.element_size(),
                actual: parent.element_size(),
            });
        }
        *self.shared.parent.acquire() = Some(Arc::downgrade(&parent.shared));
        debug!(dispatcher = %self.name(), parent = %parent.name(), "Parent linked");
        Ok(())
    }

    /// Remove the parent link
    pub fn clear_parent(&self) {
        *self.shared.parent.acquire() = None;
    }

    /// Name of the linked parent, if it is still alive
    pub fn parent_name(&self) -> Option<String> {
        self.shared.parent().map(|p| p.name().to_string())
    }

    /// Stop the worker and wait for it to exit
    ///
    /// Records still queued are discarded; once this returns no handler of
    /// this dispatcher runs again. Idempotent. Called from the worker thread
    /// itself (inside a handler) it only signals, the worker exits after the
    /// current record.
    #[instrument(name = "dispatcher_stop", skip(self), fields(dispatcher = %self.name()))]
    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        self.shared.queue.close();

        let Some(handle) = self.worker.acquire().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            warn!(dispatcher = %self.name(), "Stop requested from worker thread, not joining");
            return;
        }
        if handle.join().is_err() {
            error!(dispatcher = %self.name(), "Worker thread panicked");
        }
        info!(dispatcher = %self.name(), "Dispatcher stopped");
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn config(&self) -> &DispatcherConfig {
        self.shared.config()
    }

    pub fn element_size(&self) -> usize {
        self.shared.element_size()
    }

    pub fn ring_capacity(&self) -> usize {
        self.shared.config.ring_capacity
    }

    pub fn handler_capacity(&self) -> usize {
        self.shared.handler_capacity()
    }

    /// Number of occupied handler slots
    pub fn handler_count(&self) -> usize {
        self.shared.core.acquire().registry.occupied()
    }

    pub fn is_handler_registered(&self, index: usize) -> bool {
        self.shared.core.acquire().registry.is_occupied(index)
    }

    /// Records waiting for the worker
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.shared.queue.capacity()
    }

    /// Slot the next call will be written to
    pub fn ring_cursor(&self) -> usize {
        self.shared.core.acquire().ring.cursor()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.shared.state.get()
    }

    /// True once [`Dispatcher::stop`] has been requested
    pub fn is_stopping(&self) -> bool {
        self.shared.is_stopping()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builder for creating a Dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
}

impl DispatcherBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: DispatcherConfig::new(name, contracts::DEFAULT_RING_CAPACITY, 1),
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: DispatcherConfig) -> Self {
        Self { config }
    }

    pub fn ring_capacity(mut self, slots: usize) -> Self {
        self.config.ring_capacity = slots;
        self
    }

    pub fn element_size(mut self, bytes: usize) -> Self {
        self.config.element_size = bytes;
        self
    }

    /// Size elements for a plain-old-data type
    pub fn element_type<T: Pod>(self) -> Self {
        self.element_size(std::mem::size_of::<T>())
    }

    pub fn queue_capacity(mut self, records: usize) -> Self {
        self.config.queue_capacity = Some(records);
        self
    }

    pub fn max_handlers(mut self, handlers: usize) -> Self {
        self.config.max_handlers = handlers;
        self
    }

    pub fn worker(mut self, worker: WorkerConfig) -> Self {
        self.config.worker = worker;
        self
    }

    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.config.worker.name = Some(name.into());
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.worker.stack_size = bytes;
        self
    }

    pub fn priority_hint(mut self, hint: u8) -> Self {
        self.config.worker.priority_hint = hint;
        self
    }

    /// Construct without starting the worker
    pub fn build(self) -> Result<Dispatcher, DispatchError> {
        Dispatcher::new(self.config)
    }

    /// Construct, initialize the registry and start the worker
    pub fn spawn(self) -> Result<Dispatcher, DispatchError> {
        Dispatcher::start(self.config)
    }
}
