mod file;
mod memory;
#[allow(clippy::module_inception)]
mod r#trait;

pub use file::FileBlockMetadataStore;
pub use memory::InMemoryBlockMetadataStore;
pub use r#trait::{Block, BlockMetadataStore};
