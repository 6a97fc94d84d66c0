//! # Dispatcher
//!
//! Event-callback dispatch core.
//!
//! Responsibilities:
//! - Accept fixed-size payloads from any producer thread without blocking on handlers
//! - Keep payloads in a bounded ring, queue lightweight records for one worker
//! - Run registered handlers in slot order, forward to a parent on request
//! - Drop (and count) calls when the queue is full
//!
//! ## Example
//!
//! ```no_run
//! use dispatcher::{Dispatcher, Flow, Target};
//!
//! let bus = Dispatcher::builder("can-bus")
//!     .ring_capacity(16)
//!     .element_type::<u64>()
//!     .spawn()
//!     .unwrap();
//!
//! bus.register_fn("print", |payload: &[u8]| {
//!     println!("{payload:?}");
//!     Flow::Stop
//! }, false).unwrap();
//!
//! bus.call_pod(&42u64, Target::Broadcast).unwrap();
//! bus.stop();
//! ```

pub mod dispatcher;
pub mod error;
mod guard;
pub mod handlers;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod ring;
pub mod worker;

pub use contracts::{
    ContextHandler, DispatchRecord, DispatcherConfig, Flow, FnHandler, Handler, MetricsSnapshot,
    PodHandler, SharedHandler, Target, WorkerConfig,
};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::DispatchError;
pub use handlers::{CountingHandler, LogHandler};
pub use metrics::DispatcherMetrics;
pub use worker::WorkerState;
