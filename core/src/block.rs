//! Block values stored in chunks, and the material table the mesher and lighting consult.

mod block;
pub use block::*;

mod lookup;
pub use lookup::*;

mod material;
pub use material::*;
