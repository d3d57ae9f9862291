//! Memory Store + Reference Manager (§4.4, §4.5): the memory aggregate
//! that ties inline and blob-backed assets together over a capsule.

pub mod service;
pub mod store;
pub mod types;

pub use service::{
    memories_create, memories_create_with_internal_blobs_and_inline_assets, memories_delete,
    memories_read,
};
pub use store::MemoryStore;
pub use types::{AssetMetadata, InlineAsset, InternalBlobAsset, MemoryMetadata, MemoryRecord};
