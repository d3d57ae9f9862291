//! Session Manager storage (§4.1): the `UploadSession` table plus the
//! idempotency index keyed on `(capsule_id, caller, idem)`. Orchestration
//! (auth checks, chunk acceptance order, finalize) lives in `service.rs`;
//! this module only owns persistence.

use crate::clock::Clock;
use crate::memory_manager::{VMemory, MEM_SESSIONS, MEM_SESSION_COUNTER, MEM_SESSION_IDEM, MM};
use crate::types::CapsuleId;
use crate::upload::types::{
    SessionIdemOutcome, SessionIdemRecord, SessionId, SessionState, UploadSession,
    IDEM_RETENTION_NS,
};
use candid::Principal;
use ic_stable_structures::{StableBTreeMap, StableCell};
use std::cell::RefCell;

thread_local! {
    static SESSIONS: RefCell<StableBTreeMap<u64, UploadSession, VMemory>> = RefCell::new(
        StableBTreeMap::init(MM.with(|m| m.borrow().get(MEM_SESSIONS)))
    );

    static SESSION_COUNTER: RefCell<StableCell<u64, VMemory>> = RefCell::new(
        StableCell::init(MM.with(|m| m.borrow().get(MEM_SESSION_COUNTER)), 0)
            .expect("init session counter")
    );

    static SESSION_IDEM: RefCell<StableBTreeMap<String, SessionIdemRecord, VMemory>> = RefCell::new(
        StableBTreeMap::init(MM.with(|m| m.borrow().get(MEM_SESSION_IDEM)))
    );
}

fn idem_key(capsule_id: &CapsuleId, caller: Principal, idem: &str) -> String {
    format!("{capsule_id}\u{1}{caller}\u{1}{idem}")
}

#[derive(Default)]
pub struct SessionStore;

impl SessionStore {
    pub fn new() -> Self {
        Self
    }

    pub fn alloc_id(&self) -> SessionId {
        let id = SESSION_COUNTER.with(|c| {
            let mut cell = c.borrow_mut();
            let next = cell.get() + 1;
            cell.set(next).expect("bump session counter");
            next
        });
        SessionId(id)
    }

    pub fn insert(&self, session: UploadSession) {
        SESSIONS.with(|m| m.borrow_mut().insert(session.session_id.0, session));
    }

    pub fn get(&self, id: SessionId) -> Option<UploadSession> {
        SESSIONS.with(|m| m.borrow().get(&id.0))
    }

    pub fn remove(&self, id: SessionId) -> Option<UploadSession> {
        SESSIONS.with(|m| m.borrow_mut().remove(&id.0))
    }

    /// §3 S2: a pending (`Open`/`Finalizing`) session for the same
    /// `(capsule_id, caller, idem)` short-circuits a fresh `uploads_begin`.
    pub fn find_idem(&self, capsule_id: &CapsuleId, caller: Principal, idem: &str) -> Option<SessionIdemRecord> {
        SESSION_IDEM.with(|m| m.borrow().get(&idem_key(capsule_id, caller, idem)))
    }

    pub fn put_idem(&self, capsule_id: &CapsuleId, caller: Principal, idem: &str, record: SessionIdemRecord) {
        SESSION_IDEM.with(|m| {
            m.borrow_mut()
                .insert(idem_key(capsule_id, caller, idem), record)
        });
    }

    /// Idle sessions are swept lazily: every touch of the store drops
    /// sessions that have been silent past `SESSION_IDLE_TTL` (§4.1
    /// Expiry) instead of relying on a background cron.
    pub fn expire_idle(&self, clock: &impl Clock, idle_ttl_ns: u64) -> Vec<SessionId> {
        let now = clock.now_ns();
        let stale: Vec<SessionId> = SESSIONS.with(|m| {
            m.borrow()
                .iter()
                .filter(|(_, s)| {
                    !s.state.is_terminal() && now.saturating_sub(s.last_activity_at) > idle_ttl_ns
                })
                .map(|(id, _)| SessionId(id))
                .collect()
        });
        for id in &stale {
            if let Some(mut session) = self.remove(*id) {
                session.state = SessionState::Aborted;
                self.put_idem(
                    &session.capsule_id,
                    session.caller,
                    &session.idem_key,
                    SessionIdemRecord {
                        outcome: SessionIdemOutcome::Aborted,
                        recorded_at: now,
                    },
                );
            }
        }
        stale
    }

    /// Drops idempotency records whose terminal outcome is older than
    /// `IDEM_RETENTION` (§4.1 Expiry) so the index doesn't grow without
    /// bound.
    pub fn sweep_idem(&self, clock: &impl Clock) {
        let now = clock.now_ns();
        let stale: Vec<String> = SESSION_IDEM.with(|m| {
            m.borrow()
                .iter()
                .filter(|(_, rec)| {
                    !matches!(rec.outcome, SessionIdemOutcome::Pending(_))
                        && now.saturating_sub(rec.recorded_at) > IDEM_RETENTION_NS
                })
                .map(|(k, _)| k)
                .collect()
        });
        SESSION_IDEM.with(|m| {
            let mut m = m.borrow_mut();
            for k in stale {
                m.remove(&k);
            }
        });
    }

    pub fn total_count(&self) -> u64 {
        SESSIONS.with(|m| m.borrow().len())
    }
}
