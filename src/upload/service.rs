//! Session Manager orchestration (§4.1): admission, chunk acceptance,
//! abort and finalize, wired through the `AuthorizationHook` and the
//! persistence owned by `sessions`/`chunk_store`/`blob_registry`.

use crate::auth::AuthorizationHook;
use crate::clock::Clock;
use crate::types::{CapsuleId, Error};
use crate::upload::blob_registry::BlobRegistry;
use crate::upload::chunk_store::ChunkStore;
use crate::upload::finalize;
use crate::upload::sessions::SessionStore;
use crate::upload::types::{
    BlobId, SessionIdemOutcome, SessionIdemRecord, SessionId, SessionState, UploadFinishResult,
    UploadSession, CHUNK_SIZE_MAX, MAX_CHUNKS, SESSION_IDLE_TTL_NS,
};
use candid::Principal;

/// Distinguishes a fresh session from a deterministic replay of a terminal
/// outcome (§3 S2, scenario D).
#[derive(Debug)]
pub enum BeginOutcome {
    Session(SessionId),
    AlreadyCommitted { blob_id: BlobId },
    AlreadyAborted,
}

fn touch(sessions: &SessionStore, mut session: UploadSession, clock: &impl Clock) {
    session.last_activity_at = clock.now_ns();
    sessions.insert(session);
}

pub fn uploads_begin(
    caller: Principal,
    capsule_id: CapsuleId,
    chunk_count: u32,
    idem: String,
    auth: &impl AuthorizationHook,
    sessions: &SessionStore,
    clock: &impl Clock,
) -> Result<BeginOutcome, Error> {
    if chunk_count == 0 {
        return Err(Error::InvalidArgument("chunk_count must be > 0".into()));
    }
    if chunk_count > MAX_CHUNKS {
        return Err(Error::InvalidArgument(format!(
            "chunk_count {chunk_count} exceeds MAX_CHUNKS {MAX_CHUNKS}"
        )));
    }
    if !auth.may_write(caller, &capsule_id) {
        return Err(Error::Unauthorized);
    }

    sessions.expire_idle(clock, SESSION_IDLE_TTL_NS);
    sessions.sweep_idem(clock);

    if let Some(rec) = sessions.find_idem(&capsule_id, caller, &idem) {
        return Ok(match rec.outcome {
            SessionIdemOutcome::Pending(sid) => {
                // Only honor the replay if the session is still non-terminal;
                // otherwise fall through and mint a new one.
                match sessions.get(sid) {
                    Some(s) if !s.state.is_terminal() => BeginOutcome::Session(sid),
                    _ => return begin_fresh(caller, capsule_id, chunk_count, idem, sessions, clock),
                }
            }
            SessionIdemOutcome::Committed(blob_id) => BeginOutcome::AlreadyCommitted { blob_id },
            SessionIdemOutcome::Aborted => BeginOutcome::AlreadyAborted,
        });
    }

    begin_fresh(caller, capsule_id, chunk_count, idem, sessions, clock)
}

fn begin_fresh(
    caller: Principal,
    capsule_id: CapsuleId,
    chunk_count: u32,
    idem: String,
    sessions: &SessionStore,
    clock: &impl Clock,
) -> Result<BeginOutcome, Error> {
    let session_id = sessions.alloc_id();
    let now = clock.now_ns();
    sessions.insert(UploadSession {
        session_id,
        capsule_id: capsule_id.clone(),
        caller,
        idem_key: idem.clone(),
        expected_chunk_count: chunk_count,
        received: vec![false; chunk_count as usize],
        staged_bytes_total: 0,
        state: SessionState::Open,
        retry_unlocked: false,
        created_at: now,
        last_activity_at: now,
    });
    sessions.put_idem(
        &capsule_id,
        caller,
        &idem,
        SessionIdemRecord {
            outcome: SessionIdemOutcome::Pending(session_id),
            recorded_at: now,
        },
    );
    Ok(BeginOutcome::Session(session_id))
}

/// §4.1: earliest-failing-predicate order is existence, state, index
/// range, size limit, duplicate-bytes. The authorization hook and idle
/// sweep run first since they gate/clean state the predicates assume.
#[allow(clippy::too_many_arguments)]
pub fn uploads_put_chunk(
    caller: Principal,
    session_id: SessionId,
    index: u32,
    bytes: Vec<u8>,
    auth: &impl AuthorizationHook,
    sessions: &SessionStore,
    chunks: &ChunkStore,
    clock: &impl Clock,
) -> Result<(), Error> {
    sessions.expire_idle(clock, SESSION_IDLE_TTL_NS);

    let mut session = sessions.get(session_id).ok_or(Error::NotFound)?;
    if !auth.may_write(caller, &session.capsule_id) {
        return Err(Error::Unauthorized);
    }
    if session.state != SessionState::Open {
        return Err(Error::InvalidState(format!("{:?}", session.state)));
    }
    if index >= session.expected_chunk_count {
        return Err(Error::OutOfRange(format!(
            "index {index} >= expected_chunk_count {}",
            session.expected_chunk_count
        )));
    }
    if bytes.len() > CHUNK_SIZE_MAX {
        return Err(Error::TooLarge(format!(
            "{} bytes exceeds CHUNK_SIZE_MAX {CHUNK_SIZE_MAX}",
            bytes.len()
        )));
    }
    if let Some(existing) = chunks.get_staged(session_id, index) {
        if existing != bytes && !session.retry_unlocked {
            return Err(Error::Conflict(format!(
                "chunk {index} already staged with different bytes"
            )));
        }
        if existing == bytes {
            // Byte-equal replay: idempotent no-op past this point.
            touch(sessions, session, clock);
            return Ok(());
        }
        // retry_unlocked: client is rewriting a chunk that failed a prior
        // finish attempt (§4.2).
        session.staged_bytes_total =
            session.staged_bytes_total - existing.len() as u64 + bytes.len() as u64;
        chunks.put_staged(session_id, index, bytes);
        touch(sessions, session, clock);
        return Ok(());
    }

    session.staged_bytes_total += bytes.len() as u64;
    session.received[index as usize] = true;
    chunks.put_staged(session_id, index, bytes);
    touch(sessions, session, clock);
    Ok(())
}

pub fn uploads_abort(
    caller: Principal,
    session_id: SessionId,
    auth: &impl AuthorizationHook,
    sessions: &SessionStore,
    chunks: &ChunkStore,
    clock: &impl Clock,
) -> Result<(), Error> {
    let session = match sessions.get(session_id) {
        Some(s) => s,
        // Abort of an unknown/already-gone session is idempotent.
        None => return Ok(()),
    };
    if !auth.may_write(caller, &session.capsule_id) {
        return Err(Error::Unauthorized);
    }
    if session.state.is_terminal() {
        return Ok(());
    }

    chunks.remove_staged_all(session_id, session.expected_chunk_count);
    sessions.remove(session_id);
    sessions.put_idem(
        &session.capsule_id,
        session.caller,
        &session.idem_key,
        SessionIdemRecord {
            outcome: SessionIdemOutcome::Aborted,
            recorded_at: clock.now_ns(),
        },
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn uploads_finish(
    caller: Principal,
    session_id: SessionId,
    expected_sha256: [u8; 32],
    expected_len: u64,
    auth: &impl AuthorizationHook,
    sessions: &SessionStore,
    chunks: &ChunkStore,
    blobs: &BlobRegistry,
    clock: &impl Clock,
) -> Result<UploadFinishResult, Error> {
    let mut session = sessions.get(session_id).ok_or(Error::NotFound)?;
    if !auth.may_write(caller, &session.capsule_id) {
        return Err(Error::Unauthorized);
    }
    if session.state == SessionState::Aborted {
        return Err(Error::InvalidState("Aborted".into()));
    }

    let outcome = match finalize::finalize(&mut session, expected_sha256, expected_len, chunks, blobs, clock) {
        Ok(outcome) => outcome,
        Err(err @ (Error::IncompleteUpload | Error::LengthMismatch | Error::HashMismatch)) => {
            session.retry_unlocked = true;
            sessions.insert(session);
            return Err(err);
        }
        // `Internal`: finalize already cleared the offending index's
        // `received` bit in place. Persist that so the session doesn't
        // re-hit the same error on every subsequent finish attempt.
        Err(err) => {
            sessions.insert(session);
            return Err(err);
        }
    };

    session.state = SessionState::Committed {
        blob_id: outcome.blob_id,
    };
    sessions.put_idem(
        &session.capsule_id,
        session.caller,
        &session.idem_key,
        SessionIdemRecord {
            outcome: SessionIdemOutcome::Committed(outcome.blob_id),
            recorded_at: clock.now_ns(),
        },
    );
    sessions.remove(session_id);

    Ok(UploadFinishResult {
        blob_id: outcome.blob_id.to_string(),
    })
}
