//! Types shared by the Session Manager, Finalizer, Chunk Store and Blob
//! Registry (§3, §4.1-4.3).

use crate::types::CapsuleId;
use candid::{CandidType, Decode, Deserialize, Encode, Principal};
use ic_stable_structures::{storable::Bound, Storable};
use serde::Serialize;
use std::borrow::Cow;
use std::str::FromStr;

/// Upper bound on a single chunk's byte length, enforced in `put_chunk`.
/// Client-observable; must never change across reimplementations.
pub const CHUNK_SIZE_MAX: usize = 1_800_000;

/// Upper bound on chunks accepted by a single upload session.
pub const MAX_CHUNKS: u32 = 16_384;

/// Upper bound on an inline asset's byte length.
pub const INLINE_MAX: usize = 32 * 1024;

/// Idle sessions are aborted after this much wall-clock inactivity.
pub const SESSION_IDLE_TTL_NS: u64 = 30 * 60 * 1_000_000_000;

/// How long a terminal idempotency outcome is kept around so retries observe
/// it deterministically instead of racing a fresh attempt.
pub const IDEM_RETENTION_NS: u64 = 60 * 60 * 1_000_000_000;

/// Blob identifier: `blob_<decimal>`, monotonic and process-unique.
#[derive(Clone, Copy, Debug, CandidType, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobId(pub u64);

impl std::fmt::Display for BlobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "blob_{}", self.0)
    }
}

impl FromStr for BlobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::utils::blob_id::parse_blob_id(s).map(BlobId)
    }
}

impl Storable for BlobId {
    const BOUND: Bound = Bound::Bounded {
        max_size: 8,
        is_fixed_size: true,
    };

    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.0.to_le_bytes().to_vec())
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        let arr: [u8; 8] = bytes.as_ref().try_into().expect("BlobId is 8 bytes");
        BlobId(u64::from_le_bytes(arr))
    }
}

/// Upload session identifier, opaque to clients beyond equality.
#[derive(Clone, Copy, Debug, CandidType, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl Storable for SessionId {
    const BOUND: Bound = Bound::Bounded {
        max_size: 8,
        is_fixed_size: true,
    };

    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.0.to_le_bytes().to_vec())
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        let arr: [u8; 8] = bytes.as_ref().try_into().expect("SessionId is 8 bytes");
        SessionId(u64::from_le_bytes(arr))
    }
}

/// State machine for `UploadSession` (§3, §4.1). `Open` and `Finalizing`
/// are non-terminal; `Committed`/`Aborted` are terminal and accept no
/// further chunk writes.
#[derive(Clone, Debug, CandidType, Deserialize, Serialize, PartialEq)]
pub enum SessionState {
    Open,
    Finalizing,
    Committed { blob_id: BlobId },
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Committed { .. } | SessionState::Aborted)
    }
}

/// In-flight upload session (§3 `UploadSession`).
#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct UploadSession {
    pub session_id: SessionId,
    pub capsule_id: CapsuleId,
    pub caller: Principal,
    pub idem_key: String,
    pub expected_chunk_count: u32,
    /// Index `i` is `true` once a chunk has been accepted for it.
    pub received: Vec<bool>,
    pub staged_bytes_total: u64,
    pub state: SessionState,
    /// Set once a `uploads_finish` attempt has failed (§4.2: the client is
    /// then retryable "rewriting the offending chunks"). Unlocks
    /// overwriting an already-staged index with different bytes, which is
    /// otherwise a `Conflict` (§3 S1).
    pub retry_unlocked: bool,
    pub created_at: u64,
    pub last_activity_at: u64,
}

impl UploadSession {
    pub fn received_count(&self) -> u32 {
        self.received.iter().filter(|b| **b).count() as u32
    }
}

impl Storable for UploadSession {
    const BOUND: Bound = Bound::Bounded {
        max_size: 4096,
        is_fixed_size: false,
    };

    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(Encode!(&(1u16, self)).expect("encode UploadSession"))
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        let (version, session): (u16, UploadSession) =
            Decode!(bytes.as_ref(), (u16, UploadSession)).expect("decode UploadSession");
        assert_eq!(version, 1, "unsupported UploadSession version");
        session
    }
}

/// Immutable-after-finalization blob metadata (§3 `BlobMeta`). `ref_count`
/// and `deleted_at` are the only fields a live blob ever mutates.
#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct BlobMeta {
    pub capsule_id: CapsuleId,
    pub size: u64,
    pub sha256: [u8; 32],
    pub chunk_count: u32,
    pub chunk_size: u32,
    pub uploaded_at: u64,
    pub ref_count: u32,
    pub deleted_at: Option<u64>,
}

impl Storable for BlobMeta {
    const BOUND: Bound = Bound::Bounded {
        max_size: 256,
        is_fixed_size: false,
    };

    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(Encode!(&(1u16, self)).expect("encode BlobMeta"))
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        let (version, meta): (u16, BlobMeta) =
            Decode!(bytes.as_ref(), (u16, BlobMeta)).expect("decode BlobMeta");
        assert_eq!(version, 1, "unsupported BlobMeta version");
        meta
    }
}

/// Outcome recorded in the upload idempotency index (§3 S2, §4.1 expiry).
#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub enum SessionIdemOutcome {
    Pending(SessionId),
    Committed(BlobId),
    Aborted,
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct SessionIdemRecord {
    pub outcome: SessionIdemOutcome,
    pub recorded_at: u64,
}

impl Storable for SessionIdemRecord {
    const BOUND: Bound = Bound::Bounded {
        max_size: 128,
        is_fixed_size: false,
    };

    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(Encode!(&(1u16, self)).expect("encode SessionIdemRecord"))
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        let (version, rec): (u16, SessionIdemRecord) =
            Decode!(bytes.as_ref(), (u16, SessionIdemRecord)).expect("decode SessionIdemRecord");
        assert_eq!(version, 1, "unsupported SessionIdemRecord version");
        rec
    }
}

/// Result of a successful `uploads_finish` (§6 operation surface).
#[derive(Clone, Debug, CandidType, Deserialize, Serialize, PartialEq)]
pub struct UploadFinishResult {
    pub blob_id: String,
}
