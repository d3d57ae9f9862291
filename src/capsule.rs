//! Capsule is treated as an opaque access-control scope (§1): this module
//! only owns enough state (an id and a creator) for the `AuthorizationHook`
//! to answer `may_write`. The richer capsule object a full deployment would
//! have — sharing, delegated grants, subjects — is an external collaborator
//! per the spec and out of scope here.

use crate::clock::Clock;
use crate::memory_manager::{VMemory, MEM_CAPSULES, MEM_CAPSULE_COUNTER, MM};
use crate::types::CapsuleId;
use candid::{CandidType, Deserialize, Encode, Decode, Principal};
use ic_stable_structures::{storable::Bound, StableBTreeMap, StableCell, Storable};
use std::borrow::Cow;
use std::cell::RefCell;

#[derive(Clone, Debug, CandidType, Deserialize, PartialEq)]
pub struct Capsule {
    pub id: CapsuleId,
    pub owner: Principal,
    pub created_at: u64,
}

impl Storable for Capsule {
    const BOUND: Bound = Bound::Bounded {
        max_size: 256,
        is_fixed_size: false,
    };

    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(Encode!(&(1u16, self)).expect("encode Capsule"))
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        let (version, capsule): (u16, Capsule) =
            Decode!(bytes.as_ref(), (u16, Capsule)).expect("decode Capsule");
        assert_eq!(version, 1, "unsupported Capsule version");
        capsule
    }
}

thread_local! {
    static CAPSULES: RefCell<StableBTreeMap<CapsuleId, Capsule, VMemory>> = RefCell::new(
        StableBTreeMap::init(MM.with(|m| m.borrow().get(MEM_CAPSULES)))
    );

    static CAPSULE_COUNTER: RefCell<StableCell<u64, VMemory>> = RefCell::new(
        StableCell::init(MM.with(|m| m.borrow().get(MEM_CAPSULE_COUNTER)), 0)
            .expect("init capsule counter")
    );
}

/// Thin wrapper over the stable capsule map; the only store the
/// `AuthorizationHook` needs to consult.
#[derive(Default)]
pub struct CapsuleStore;

impl CapsuleStore {
    pub fn new() -> Self {
        Self
    }

    pub fn get(&self, id: &CapsuleId) -> Option<Capsule> {
        CAPSULES.with(|c| c.borrow().get(id))
    }

    pub fn insert(&self, capsule: Capsule) {
        CAPSULES.with(|c| c.borrow_mut().insert(capsule.id.clone(), capsule));
    }
}

/// `capsules_create`: allocate a fresh capsule owned by `caller`.
pub fn capsules_create(caller: Principal, clock: &impl Clock) -> CapsuleId {
    let next = CAPSULE_COUNTER.with(|c| {
        let mut cell = c.borrow_mut();
        let id = cell.get() + 1;
        cell.set(id).expect("bump capsule counter");
        id
    });
    let id = format!("capsule_{next}");
    CapsuleStore::new().insert(Capsule {
        id: id.clone(),
        owner: caller,
        created_at: clock.now_ns(),
    });
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;

    #[test]
    fn create_allocates_distinct_ids_owned_by_caller() {
        let clock = FakeClock::new(1);
        let caller = Principal::anonymous();
        let a = capsules_create(caller, &clock);
        let b = capsules_create(caller, &clock);
        assert_ne!(a, b);
        assert_eq!(CapsuleStore::new().get(&a).unwrap().owner, caller);
    }
}
