//! CountingHandler - counts invocations and keeps the last payload

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use contracts::{Flow, Handler};

/// Handler that counts what it receives
///
/// Cloning the counters out is cheap; the handler itself is usually held in
/// an `Arc` shared with the registering code.
pub struct CountingHandler {
    name: String,
    flow: Flow,
    invocations: AtomicU64,
    bytes: AtomicU64,
    last: Mutex<Vec<u8>>,
}

impl CountingHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flow: Flow::Stop,
            invocations: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            last: Mutex::new(Vec::new()),
        }
    }

    /// Verdict returned after counting
    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flow = flow;
        self
    }

    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Acquire)
    }

    /// Total payload bytes seen
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Copy of the most recent payload (empty before the first invocation)
    pub fn last_payload(&self) -> Vec<u8> {
        self.last
            .lock()
            .map(|last| last.clone())
            .unwrap_or_default()
    }
}

impl Handler for CountingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, payload: &[u8]) -> Flow {
        if let Ok(mut last) = self.last.lock() {
            last.clear();
            last.extend_from_slice(payload);
        }
        self.bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);
        self.invocations.fetch_add(1, Ordering::Release);
        self.flow
    }
}
