//! Finalizer (§4.2): on `uploads_finish`, verifies the concatenated
//! chunks' length and SHA-256 against the client's claim, then promotes the
//! session's staged chunks into a freshly allocated blob.

use crate::clock::Clock;
use crate::types::Error;
use crate::upload::blob_registry::BlobRegistry;
use crate::upload::chunk_store::ChunkStore;
use crate::upload::types::{BlobId, BlobMeta, CHUNK_SIZE_MAX};
use crate::upload::types::{SessionId, UploadSession};
use sha2::{Digest, Sha256};

#[derive(Debug)]
pub struct FinalizeOutcome {
    pub blob_id: BlobId,
}

/// Runs the checks in the order the spec fixes them: completeness, then
/// length, then hash (§4.2). Any failure leaves the session retryable —
/// callers rewrite the offending chunk(s) and call finish again. On the
/// `Internal` path (bitset says present, bytes are gone), the offending
/// index's `received` bit is cleared in place so the session stays a
/// clean `Open` rather than re-hitting the same error forever (§7).
pub fn finalize(
    session: &mut UploadSession,
    expected_sha256: [u8; 32],
    expected_len: u64,
    chunks: &ChunkStore,
    blobs: &BlobRegistry,
    clock: &impl Clock,
) -> Result<FinalizeOutcome, Error> {
    if session.received_count() != session.expected_chunk_count {
        return Err(Error::IncompleteUpload);
    }

    let mut hasher = Sha256::new();
    let mut actual_len: u64 = 0;
    for i in 0..session.expected_chunk_count {
        let bytes = match chunks.get_staged(session.session_id, i) {
            Some(bytes) => bytes,
            None => {
                // Bitset claimed this index was present but the bytes are
                // gone: an invariant violation, not a client-correctable
                // error. Clear it so a retry can stage it fresh instead of
                // tripping IncompleteUpload or Internal again.
                session.received[i as usize] = false;
                return Err(Error::Internal(format!("missing staged chunk {i}")));
            }
        };
        actual_len += bytes.len() as u64;
        hasher.update(&bytes);
    }

    if actual_len != expected_len {
        return Err(Error::LengthMismatch);
    }
    let actual_sha256: [u8; 32] = hasher.finalize().into();
    if actual_sha256 != expected_sha256 {
        return Err(Error::HashMismatch);
    }

    let blob_id = blobs.alloc_id();
    chunks.promote(session.session_id, blob_id, session.expected_chunk_count);

    let chunk_size = if session.expected_chunk_count > 0 {
        CHUNK_SIZE_MAX as u32
    } else {
        0
    };
    blobs.insert(
        blob_id,
        BlobMeta {
            capsule_id: session.capsule_id.clone(),
            size: actual_len,
            sha256: actual_sha256,
            chunk_count: session.expected_chunk_count,
            chunk_size,
            uploaded_at: clock.now_ns(),
            ref_count: 0,
            deleted_at: None,
        },
    );

    Ok(FinalizeOutcome { blob_id })
}

#[allow(dead_code)]
pub fn session_id_of(session: &UploadSession) -> SessionId {
    session.session_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;
    use crate::types::CapsuleId;
    use crate::upload::types::{SessionState};
    use candid::Principal;

    fn make_session(expected_chunk_count: u32) -> UploadSession {
        UploadSession {
            session_id: SessionId(1),
            capsule_id: CapsuleId::from("capsule_1"),
            caller: Principal::anonymous(),
            idem_key: "k".into(),
            expected_chunk_count,
            received: vec![true; expected_chunk_count as usize],
            staged_bytes_total: 0,
            state: SessionState::Open,
            retry_unlocked: false,
            created_at: 1,
            last_activity_at: 1,
        }
    }

    #[test]
    fn round_trip_single_chunk() {
        let chunks = ChunkStore::new();
        let blobs = BlobRegistry::new();
        let clock = FakeClock::new(1);
        let mut session = make_session(1);
        chunks.put_staged(session.session_id, 0, b"Hello".to_vec());

        let mut hasher = Sha256::new();
        hasher.update(b"Hello");
        let expected_hash: [u8; 32] = hasher.finalize().into();

        let outcome = finalize(&mut session, expected_hash, 5, &chunks, &blobs, &clock).unwrap();
        let meta = blobs.get_meta(outcome.blob_id).unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.sha256, expected_hash);
        assert_eq!(chunks.get_blob_chunk(outcome.blob_id, 0).unwrap(), b"Hello");
        assert!(chunks.get_staged(session.session_id, 0).is_none());
    }

    #[test]
    fn hash_mismatch_is_retryable() {
        let chunks = ChunkStore::new();
        let blobs = BlobRegistry::new();
        let clock = FakeClock::new(1);
        let mut session = make_session(1);
        chunks.put_staged(session.session_id, 0, vec![0u8; 10]);

        let wrong_hash = [0xffu8; 32];
        let err = finalize(&mut session, wrong_hash, 10, &chunks, &blobs, &clock).unwrap_err();
        assert_eq!(err, Error::HashMismatch);
        // Staged bytes untouched, client can retry with corrected bytes.
        assert!(chunks.get_staged(session.session_id, 0).is_some());
    }

    #[test]
    fn incomplete_upload_when_chunk_missing() {
        let chunks = ChunkStore::new();
        let blobs = BlobRegistry::new();
        let clock = FakeClock::new(1);
        let mut session = make_session(2);
        session.received = vec![true, false];
        chunks.put_staged(session.session_id, 0, vec![1u8; 5]);

        let err = finalize(&mut session, [0u8; 32], 5, &chunks, &blobs, &clock).unwrap_err();
        assert_eq!(err, Error::IncompleteUpload);
    }

    #[test]
    fn length_mismatch() {
        let chunks = ChunkStore::new();
        let blobs = BlobRegistry::new();
        let clock = FakeClock::new(1);
        let mut session = make_session(1);
        chunks.put_staged(session.session_id, 0, vec![0u8; 10]);

        let err = finalize(&mut session, [0u8; 32], 11, &chunks, &blobs, &clock).unwrap_err();
        assert_eq!(err, Error::LengthMismatch);
    }

    #[test]
    fn missing_staged_chunk_clears_received_bit_for_retry() {
        let chunks = ChunkStore::new();
        let blobs = BlobRegistry::new();
        let clock = FakeClock::new(1);
        let mut session = make_session(2);
        // Bitset claims both chunks arrived, but index 1's bytes were
        // never actually staged (or were lost) — an invariant violation.
        chunks.put_staged(session.session_id, 0, vec![0u8; 5]);

        let err = finalize(&mut session, [0u8; 32], 10, &chunks, &blobs, &clock).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(!session.received[1], "offending index must be cleared");
        assert!(session.received[0], "unrelated index left untouched");
    }
}
