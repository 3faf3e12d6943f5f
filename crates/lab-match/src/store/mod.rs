//! Reference adapters for the snapshot and run contracts.

mod json_file;
mod memory;
mod rows;

pub use json_file::JsonFileStore;
pub use memory::InMemoryStore;
