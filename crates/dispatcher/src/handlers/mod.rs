//! Bundled handler implementations
//!
//! Contains LogHandler and CountingHandler.

mod counting;
mod log;

pub use self::counting::CountingHandler;
pub use self::log::LogHandler;
