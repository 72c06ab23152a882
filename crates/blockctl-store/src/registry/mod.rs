mod file;
mod memory;
#[allow(clippy::module_inception)]
mod r#trait;

pub use file::FileNodeRegistry;
pub use memory::InMemoryNodeRegistry;
pub use r#trait::{NodeRegistry, WorkerEntry};
