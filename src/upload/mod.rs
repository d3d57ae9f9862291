//! Chunked upload pipeline (§4.1-4.3): Session Manager, Finalizer, Chunk
//! Store and Blob Registry.

pub mod blob_registry;
pub mod chunk_store;
pub mod finalize;
pub mod service;
pub mod sessions;
pub mod types;

pub use blob_registry::BlobRegistry;
pub use chunk_store::ChunkStore;
pub use service::{uploads_abort, uploads_begin, uploads_finish, uploads_put_chunk, BeginOutcome};
pub use sessions::SessionStore;
pub use types::{
    BlobId, BlobMeta, SessionId, UploadFinishResult, CHUNK_SIZE_MAX, INLINE_MAX, MAX_CHUNKS,
    SESSION_IDLE_TTL_NS,
};
