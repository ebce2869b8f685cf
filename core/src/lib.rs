//! Chunk lifecycle and streaming for an effectively infinite voxel world.
//!
//! The server keeps the columns around its viewers resident, generating, populating and
//! persisting them on a background thread. Clients keep a fixed window of columns around
//! their own viewer, request them over the network, and turn them into section meshes
//! which are culled by a visibility flood fill.
//!
//! Library Notes:
//! - [profiling](https://crates.io/crates/profiling)
//! - [dashmap](https://crates.io/crates/dashmap) for the server chunk cache
//! - [bincode](https://crates.io/crates/bincode) for chunk saves and chunk packets

pub mod block;
pub mod client;
pub mod common;
pub mod graphics;
pub mod logging;
pub mod server;
