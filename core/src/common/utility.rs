mod data_file;
pub use data_file::*;

mod thread;
pub use thread::*;
