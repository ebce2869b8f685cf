mod chunk;
pub use chunk::*;

pub mod cache;
pub use cache::Cache;

pub(crate) mod requester;
