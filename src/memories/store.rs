//! Memory Store persistence (§4.4): the `MemoryRecord` table plus the
//! idempotency index for `memories_create_*`.

use crate::memory_manager::{VMemory, MEM_MEMORIES, MEM_MEMORY_COUNTER, MEM_MEMORY_IDEM, MM};
use crate::memories::types::{MemoryIdemRecord, MemoryRecord};
use crate::types::{CapsuleId, MemoryId};
use candid::Principal;
use ic_stable_structures::{StableBTreeMap, StableCell};
use std::cell::RefCell;

thread_local! {
    static MEMORIES: RefCell<StableBTreeMap<MemoryId, MemoryRecord, VMemory>> = RefCell::new(
        StableBTreeMap::init(MM.with(|m| m.borrow().get(MEM_MEMORIES)))
    );

    static MEMORY_COUNTER: RefCell<StableCell<u64, VMemory>> = RefCell::new(
        StableCell::init(MM.with(|m| m.borrow().get(MEM_MEMORY_COUNTER)), 0)
            .expect("init memory counter")
    );

    static MEMORY_IDEM: RefCell<StableBTreeMap<String, MemoryIdemRecord, VMemory>> = RefCell::new(
        StableBTreeMap::init(MM.with(|m| m.borrow().get(MEM_MEMORY_IDEM)))
    );
}

fn idem_key(capsule_id: &CapsuleId, caller: Principal, idem: &str) -> String {
    format!("{capsule_id}\u{1}{caller}\u{1}{idem}")
}

#[derive(Default)]
pub struct MemoryStore;

impl MemoryStore {
    pub fn new() -> Self {
        Self
    }

    pub fn alloc_id(&self) -> MemoryId {
        let next = MEMORY_COUNTER.with(|c| {
            let mut cell = c.borrow_mut();
            let id = cell.get() + 1;
            cell.set(id).expect("bump memory counter");
            id
        });
        format!("memory_{next}")
    }

    pub fn insert(&self, record: MemoryRecord) {
        MEMORIES.with(|m| m.borrow_mut().insert(record.memory_id.clone(), record));
    }

    pub fn get(&self, id: &MemoryId) -> Option<MemoryRecord> {
        MEMORIES.with(|m| m.borrow().get(id))
    }

    pub fn remove(&self, id: &MemoryId) -> Option<MemoryRecord> {
        MEMORIES.with(|m| m.borrow_mut().remove(id))
    }

    pub fn find_idem(
        &self,
        capsule_id: &CapsuleId,
        caller: Principal,
        idem: &str,
    ) -> Option<MemoryIdemRecord> {
        MEMORY_IDEM.with(|m| m.borrow().get(&idem_key(capsule_id, caller, idem)))
    }

    pub fn put_idem(
        &self,
        capsule_id: &CapsuleId,
        caller: Principal,
        idem: &str,
        record: MemoryIdemRecord,
    ) {
        MEMORY_IDEM.with(|m| {
            m.borrow_mut()
                .insert(idem_key(capsule_id, caller, idem), record)
        });
    }
}
