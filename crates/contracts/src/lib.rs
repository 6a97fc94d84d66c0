//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace:
//! the handler capability, dispatch metadata, configuration and errors.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Payload Model
//! - A payload is a fixed-size byte element; its size is set per dispatcher
//! - Plain-old-data values travel through `bytemuck`

mod config;
mod dispatch;
mod error;
mod handler;

pub use config::*;
pub use dispatch::*;
pub use error::*;
pub use handler::*;
