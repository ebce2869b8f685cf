pub mod network;
pub mod world;
