//! [CLIENT ONLY] The client's view of the world: the chunks around its viewer,
//! the thread which asks the server for them, and the terrain façade.

pub mod chunk;

mod settings;
pub use settings::*;

mod terrain;
pub use terrain::*;
