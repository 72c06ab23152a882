pub mod error;
mod lock;
pub mod metadata;
pub mod registry;

pub use error::{StoreError, StoreErrorSource};
pub use metadata::{Block, BlockMetadataStore, FileBlockMetadataStore, InMemoryBlockMetadataStore};
pub use registry::{FileNodeRegistry, InMemoryNodeRegistry, NodeRegistry, WorkerEntry};
