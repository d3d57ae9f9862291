//! Blob Registry (§4.3): owns `BlobMeta`, blob id allocation and reference
//! counting. Ref counts are the sole mutable field of a live blob's
//! metadata (§5) — everything else is written once at finalize and never
//! touched again.

use crate::memory_manager::{VMemory, MEM_BLOB_COUNTER, MEM_BLOB_META, MM};
use crate::types::Error;
use crate::upload::chunk_store::ChunkStore;
use crate::upload::types::{BlobId, BlobMeta};
use ic_stable_structures::{StableBTreeMap, StableCell};
use std::cell::RefCell;

thread_local! {
    static BLOB_META: RefCell<StableBTreeMap<u64, BlobMeta, VMemory>> = RefCell::new(
        StableBTreeMap::init(MM.with(|m| m.borrow().get(MEM_BLOB_META)))
    );

    static BLOB_COUNTER: RefCell<StableCell<u64, VMemory>> = RefCell::new(
        StableCell::init(MM.with(|m| m.borrow().get(MEM_BLOB_COUNTER)), 0)
            .expect("init blob counter")
    );
}

#[derive(Default)]
pub struct BlobRegistry;

impl BlobRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn alloc_id(&self) -> BlobId {
        let id = BLOB_COUNTER.with(|c| {
            let mut cell = c.borrow_mut();
            let next = cell.get() + 1;
            cell.set(next).expect("bump blob counter");
            next
        });
        BlobId(id)
    }

    pub fn insert(&self, id: BlobId, meta: BlobMeta) {
        BLOB_META.with(|m| m.borrow_mut().insert(id.0, meta));
    }

    /// Live blobs only — a deleted blob's metadata is gone, not tombstoned
    /// (§4.3 read contract).
    pub fn get_meta(&self, id: BlobId) -> Result<BlobMeta, Error> {
        BLOB_META
            .with(|m| m.borrow().get(&id.0))
            .ok_or(Error::NotFound)
    }

    pub fn incref(&self, id: BlobId, n: u32) -> Result<u32, Error> {
        BLOB_META.with(|m| {
            let mut m = m.borrow_mut();
            let mut meta = m.get(&id.0).ok_or(Error::NotFound)?;
            meta.ref_count += n;
            let count = meta.ref_count;
            m.insert(id.0, meta);
            Ok(count)
        })
    }

    pub fn decref(&self, id: BlobId, n: u32) -> Result<u32, Error> {
        BLOB_META.with(|m| {
            let mut m = m.borrow_mut();
            let mut meta = m.get(&id.0).ok_or(Error::NotFound)?;
            meta.ref_count = meta.ref_count.saturating_sub(n);
            let count = meta.ref_count;
            m.insert(id.0, meta);
            Ok(count)
        })
    }

    /// Removes the blob's metadata and chunks iff its ref count is already
    /// zero. Returns whether a deletion happened (`false` on a no-op when
    /// the blob is still referenced or already gone).
    pub fn delete_if_unreferenced(&self, id: BlobId) -> Result<bool, Error> {
        let meta = match BLOB_META.with(|m| m.borrow().get(&id.0)) {
            Some(meta) => meta,
            None => return Ok(false),
        };
        if meta.ref_count > 0 {
            return Ok(false);
        }
        BLOB_META.with(|m| m.borrow_mut().remove(&id.0));
        ChunkStore::new().remove_blob_all(id, meta.chunk_count);
        Ok(true)
    }

    /// `blob_delete`: explicit client-facing deletion (§4.3). Refuses a
    /// still-referenced blob rather than silently decrementing anything —
    /// callers that want ref-count-driven cleanup go through
    /// `memories_delete` instead.
    pub fn delete(&self, id: BlobId) -> Result<(), Error> {
        let meta = self.get_meta(id)?;
        if meta.ref_count > 0 {
            return Err(Error::InvalidArgument(format!(
                "blob {id} is still referenced ({} refs)",
                meta.ref_count
            )));
        }
        self.delete_if_unreferenced(id)?;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        BLOB_META.with(|m| m.borrow().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_meta(chunk_count: u32) -> BlobMeta {
        BlobMeta {
            capsule_id: "capsule_1".to_string(),
            size: 0,
            sha256: [0u8; 32],
            chunk_count,
            chunk_size: 0,
            uploaded_at: 1,
            ref_count: 0,
            deleted_at: None,
        }
    }

    #[test]
    fn delete_refuses_referenced_blob() {
        let reg = BlobRegistry::new();
        let id = reg.alloc_id();
        reg.insert(id, seed_meta(0));
        reg.incref(id, 1).unwrap();
        assert!(matches!(reg.delete(id), Err(Error::InvalidArgument(_))));
        reg.decref(id, 1).unwrap();
        assert!(reg.delete(id).is_ok());
        assert!(matches!(reg.get_meta(id), Err(Error::NotFound)));
    }

    #[test]
    fn delete_if_unreferenced_is_idempotent_no_op_when_missing() {
        let reg = BlobRegistry::new();
        let fake = BlobId(999_999);
        assert!(!reg.delete_if_unreferenced(fake).unwrap());
    }
}
