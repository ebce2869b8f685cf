//! [SERVER ONLY] The authoritative terrain: resident chunks, their loading and unloading,
//! persistence, and the queue through which block changes are applied.

pub mod chunk;

mod settings;
pub use settings::*;

pub mod storage;

mod terrain;
pub use terrain::*;

mod viewer;
pub use viewer::*;
