pub mod block_io;
pub mod file_set;

pub use file_set::{FileRegistry, FileSet};
