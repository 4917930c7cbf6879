//! Built-in tools

mod read_file;

pub use read_file::ReadFileTool;
