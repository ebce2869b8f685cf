//! Section meshing and visibility for the client's voxel terrain.

mod face;
pub use face::*;

mod mesh;
pub use mesh::*;

mod renderer;
pub use renderer::*;

mod section;
pub use section::*;

mod visibility;
pub use visibility::*;

mod worker;
pub use worker::*;
