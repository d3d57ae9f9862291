//! Single global `MemoryManager` so every stable structure in the crate
//! draws from one pool of virtual memories without id collisions. Keep the
//! constants sequential and documented; never reuse a retired id.

use ic_stable_structures::memory_manager::{MemoryId, MemoryManager};
use ic_stable_structures::DefaultMemoryImpl;
use std::cell::RefCell;

pub type VMemory = ic_stable_structures::memory_manager::VirtualMemory<DefaultMemoryImpl>;

thread_local! {
    pub static MM: RefCell<MemoryManager<DefaultMemoryImpl>> =
        RefCell::new(MemoryManager::init(DefaultMemoryImpl::default()));
}

pub const MEM_CAPSULES: MemoryId = MemoryId::new(0);
pub const MEM_CAPSULE_COUNTER: MemoryId = MemoryId::new(1);

pub const MEM_SESSIONS: MemoryId = MemoryId::new(2);
pub const MEM_SESSION_CHUNKS: MemoryId = MemoryId::new(3);
pub const MEM_SESSION_COUNTER: MemoryId = MemoryId::new(4);
pub const MEM_SESSION_IDEM: MemoryId = MemoryId::new(5);

pub const MEM_BLOB_META: MemoryId = MemoryId::new(6);
pub const MEM_BLOB_CHUNKS: MemoryId = MemoryId::new(7);
pub const MEM_BLOB_COUNTER: MemoryId = MemoryId::new(8);

pub const MEM_MEMORIES: MemoryId = MemoryId::new(9);
pub const MEM_MEMORY_COUNTER: MemoryId = MemoryId::new(10);
pub const MEM_MEMORY_IDEM: MemoryId = MemoryId::new(11);

// Reserved for future use (12-15).
