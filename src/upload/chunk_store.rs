//! Chunk Store (§4.3): persists `(key, index) -> bytes` for two disjoint
//! namespaces — a session's staging area and a finalized blob's permanent
//! chunks — and moves bytes between them on finalize rather than copying
//! (§9 Design Notes: "keeps two namespaces... transfers by rename").

use crate::memory_manager::{VMemory, MEM_BLOB_CHUNKS, MEM_SESSION_CHUNKS, MM};
use crate::upload::types::{BlobId, SessionId};
use ic_stable_structures::StableBTreeMap;
use std::cell::RefCell;

thread_local! {
    static SESSION_CHUNKS: RefCell<StableBTreeMap<(u64, u32), Vec<u8>, VMemory>> = RefCell::new(
        StableBTreeMap::init(MM.with(|m| m.borrow().get(MEM_SESSION_CHUNKS)))
    );

    static BLOB_CHUNKS: RefCell<StableBTreeMap<(u64, u32), Vec<u8>, VMemory>> = RefCell::new(
        StableBTreeMap::init(MM.with(|m| m.borrow().get(MEM_BLOB_CHUNKS)))
    );
}

#[derive(Default)]
pub struct ChunkStore;

impl ChunkStore {
    pub fn new() -> Self {
        Self
    }

    pub fn put_staged(&self, session_id: SessionId, index: u32, bytes: Vec<u8>) {
        SESSION_CHUNKS.with(|m| m.borrow_mut().insert((session_id.0, index), bytes));
    }

    pub fn get_staged(&self, session_id: SessionId, index: u32) -> Option<Vec<u8>> {
        SESSION_CHUNKS.with(|m| m.borrow().get(&(session_id.0, index)))
    }

    pub fn remove_staged_all(&self, session_id: SessionId, chunk_count: u32) {
        SESSION_CHUNKS.with(|m| {
            let mut m = m.borrow_mut();
            for i in 0..chunk_count {
                m.remove(&(session_id.0, i));
            }
        });
    }

    /// Move every staged chunk of `session_id` into `blob_id`'s permanent
    /// namespace. Moves rather than copies: the staging entry is gone the
    /// instant the blob entry is written, so a crash mid-loop leaves a
    /// prefix fully transferred and the remainder untouched — safe to
    /// re-run from chunk 0 (already-moved indices are simply no-ops, since
    /// `get_staged` on a moved index returns `None` and is skipped).
    pub fn promote(&self, session_id: SessionId, blob_id: BlobId, chunk_count: u32) {
        for i in 0..chunk_count {
            if let Some(bytes) = self.get_staged(session_id, i) {
                self.put_blob(blob_id, i, bytes);
                SESSION_CHUNKS.with(|m| {
                    m.borrow_mut().remove(&(session_id.0, i));
                });
            }
        }
    }

    pub fn put_blob(&self, blob_id: BlobId, index: u32, bytes: Vec<u8>) {
        BLOB_CHUNKS.with(|m| m.borrow_mut().insert((blob_id.0, index), bytes));
    }

    pub fn get_blob_chunk(&self, blob_id: BlobId, index: u32) -> Option<Vec<u8>> {
        BLOB_CHUNKS.with(|m| m.borrow().get(&(blob_id.0, index)))
    }

    pub fn remove_blob_all(&self, blob_id: BlobId, chunk_count: u32) {
        BLOB_CHUNKS.with(|m| {
            let mut m = m.borrow_mut();
            for i in 0..chunk_count {
                m.remove(&(blob_id.0, i));
            }
        });
    }
}
