//! Authorization Hook (§4.5): a single predicate consulted at the entry of
//! every mutating operation. The core never interprets *why* a caller may or
//! may not write — that policy lives entirely behind this trait, mirroring
//! how `CapsuleAcl` keeps access-control logic out of the memory operations
//! that consume it.

use crate::types::CapsuleId;
use candid::Principal;

/// Pluggable write-authorization predicate.
pub trait AuthorizationHook {
    fn may_write(&self, caller: Principal, capsule_id: &CapsuleId) -> bool;
}

/// Default hook: a capsule may be written by its creator only. Suitable for
/// the single-tenant deployment this crate ships with; swap in a richer
/// hook (owners + controllers, delegated grants, ...) without touching the
/// upload or memory modules.
pub struct CapsuleOwnerHook<'a> {
    pub capsules: &'a crate::capsule::CapsuleStore,
}

impl<'a> AuthorizationHook for CapsuleOwnerHook<'a> {
    fn may_write(&self, caller: Principal, capsule_id: &CapsuleId) -> bool {
        match self.capsules.get(capsule_id) {
            Some(capsule) => capsule.owner == caller,
            None => false,
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::AuthorizationHook;
    use crate::types::CapsuleId;
    use candid::Principal;

    /// Always-allow hook for tests that aren't exercising authorization.
    pub struct AllowAll;

    impl AuthorizationHook for AllowAll {
        fn may_write(&self, _caller: Principal, _capsule_id: &CapsuleId) -> bool {
            true
        }
    }

    /// Always-deny hook for exercising the `Unauthorized` path.
    pub struct DenyAll;

    impl AuthorizationHook for DenyAll {
        fn may_write(&self, _caller: Principal, _capsule_id: &CapsuleId) -> bool {
            false
        }
    }
}
