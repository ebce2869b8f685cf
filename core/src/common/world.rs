//! World data shared by the server and the client:
//! column coordinates, the chunk record and its lifecycle, viewer relevance,
//! and the collaborators (generator and populator) which fill chunks.

pub mod chunk;
pub use chunk::Chunk;

mod error;
pub use error::*;

pub mod generator;

mod neighborhood;
pub use neighborhood::*;

mod point;
pub use point::*;

mod relevance;
pub use relevance::*;
