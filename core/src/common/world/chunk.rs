//! The chunk record shared by the server and the client: its identity, lifecycle state,
//! and the lock-guarded voxel data (blocks, light, height map, metadata and entities).

mod chunk;
pub use chunk::*;

mod data;
pub use data::*;

mod entity;
pub use entity::*;

mod save;
pub use save::*;

mod state;
pub use state::*;

mod update;
pub use update::*;
