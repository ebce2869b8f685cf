mod chunk;
pub use chunk::*;

pub mod cache;
pub use cache::Cache;

/// Structures & Functions used internally to handle the loading of chunks on a thread.
pub(crate) mod thread;

/// The single consumer of queued block changes.
pub mod updater;
