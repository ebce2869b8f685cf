pub mod network;
pub mod utility;
pub mod world;
