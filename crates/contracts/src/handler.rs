//! Handler trait - Dispatcher callback interface
//!
//! A handler is the capability invoked by the dispatch worker for every
//! matching record. Any per-handler context lives inside the implementor.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use bytemuck::Pod;

/// Handler verdict after seeing a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Forward the payload to the parent dispatcher (if one is linked)
    Propagate,
    /// Do not forward
    Stop,
}

impl Flow {
    /// Whether the payload should be forwarded
    pub fn is_propagate(self) -> bool {
        matches!(self, Flow::Propagate)
    }
}

impl From<bool> for Flow {
    fn from(propagate: bool) -> Self {
        if propagate {
            Flow::Propagate
        } else {
            Flow::Stop
        }
    }
}

/// Event handler trait
///
/// All registered callbacks implement this trait. Handlers run on the
/// dispatcher's worker thread, one at a time, in registry index order.
pub trait Handler: Send + Sync {
    /// Handler name (used for logging/metrics)
    fn name(&self) -> &str {
        "handler"
    }

    /// Handle one payload
    ///
    /// `payload` is a whole-element copy of the ring slot, exactly
    /// `element_size` bytes long.
    fn invoke(&self, payload: &[u8]) -> Flow;
}

/// Shared handler reference stored in registry slots
pub type SharedHandler = Arc<dyn Handler>;

/// Handler backed by a closure
pub struct FnHandler<F> {
    name: String,
    func: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&[u8]) -> Flow + Send + Sync,
{
    /// Wrap a closure as a named handler
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&[u8]) -> Flow + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, payload: &[u8]) -> Flow {
        (self.func)(payload)
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

/// Handler pairing a plain function with a shared context value
///
/// This is the typed form of the "function + opaque parameter" registration.
pub struct ContextHandler<C> {
    name: String,
    func: fn(&[u8], &C) -> Flow,
    context: Arc<C>,
}

impl<C: Send + Sync> ContextHandler<C> {
    /// Create a handler that receives `context` on every invocation
    pub fn new(name: impl Into<String>, func: fn(&[u8], &C) -> Flow, context: Arc<C>) -> Self {
        Self {
            name: name.into(),
            func,
            context,
        }
    }

    /// The stored context
    pub fn context(&self) -> &Arc<C> {
        &self.context
    }
}

impl<C: Send + Sync> Handler for ContextHandler<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, payload: &[u8]) -> Flow {
        (self.func)(payload, &self.context)
    }
}

/// Handler that decodes the payload as a plain-old-data value
///
/// Payloads shorter than `size_of::<T>()` are not decoded and yield
/// [`Flow::Stop`]; longer payloads are decoded from their prefix.
pub struct PodHandler<T, F> {
    name: String,
    func: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, F> PodHandler<T, F>
where
    T: Pod,
    F: Fn(&T) -> Flow + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _marker: PhantomData,
        }
    }
}

impl<T, F> Handler for PodHandler<T, F>
where
    T: Pod,
    F: Fn(&T) -> Flow + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, payload: &[u8]) -> Flow {
        let size = mem::size_of::<T>();
        match payload.get(..size) {
            Some(bytes) => {
                let value: T = bytemuck::pod_read_unaligned(bytes);
                (self.func)(&value)
            }
            None => Flow::Stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_flow_from_bool() {
        assert_eq!(Flow::from(true), Flow::Propagate);
        assert_eq!(Flow::from(false), Flow::Stop);
        assert!(Flow::Propagate.is_propagate());
    }

    #[test]
    fn test_fn_handler() {
        let handler = FnHandler::new("echo", |p: &[u8]| Flow::from(p[0] > 0));
        assert_eq!(handler.name(), "echo");
        assert_eq!(handler.invoke(&[1]), Flow::Propagate);
        assert_eq!(handler.invoke(&[0]), Flow::Stop);
    }

    #[test]
    fn test_context_handler_sees_context() {
        fn count(_payload: &[u8], hits: &AtomicUsize) -> Flow {
            hits.fetch_add(1, Ordering::SeqCst);
            Flow::Stop
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let handler = ContextHandler::new("count", count, Arc::clone(&hits));
        handler.invoke(&[0; 4]);
        handler.invoke(&[0; 4]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(handler.context().load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pod_handler_decodes_prefix() {
        let handler = PodHandler::new("u32", |v: &u32| Flow::from(*v == 0xDEAD_BEEF));
        let mut payload = 0xDEAD_BEEFu32.to_ne_bytes().to_vec();
        payload.extend_from_slice(&[0xFF; 4]);
        assert_eq!(handler.invoke(&payload), Flow::Propagate);
    }

    #[test]
    fn test_pod_handler_short_payload() {
        let handler = PodHandler::new("u64", |_: &u64| Flow::Propagate);
        assert_eq!(handler.invoke(&[1, 2, 3]), Flow::Stop);
    }
}
