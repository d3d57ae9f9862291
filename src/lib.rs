//! Capsule-scoped upload and asset storage core.
//!
//! Three intertwined concerns (§1): chunked upload sessions, a
//! content-addressed blob store, and the memory aggregate that attaches
//! blobs and inline bytes to a capsule. Authentication, the richer capsule
//! object, transport and any image pipeline are external collaborators —
//! this crate only consumes a `capsule_id`, an `AuthorizationHook`, and
//! whatever bytes it is handed.

use candid::Principal;

mod auth;
mod capsule;
mod clock;
mod memories;
mod memory_manager;
mod types;
mod upload;
mod utils;

use auth::CapsuleOwnerHook;
use capsule::CapsuleStore;
use clock::IcClock;
use memories::{AssetMetadata, InlineAsset, InternalBlobAsset, MemoryMetadata, MemoryRecord, MemoryStore};
use types::{CapsuleId, Error, MemoryId};
use upload::{
    BeginOutcome, BlobId, BlobMeta, BlobRegistry, ChunkStore, SessionId, SessionStore,
    UploadFinishResult,
};

fn caller() -> Principal {
    ic_cdk::api::msg_caller()
}

// ============================================================================
// CAPSULE MANAGEMENT
// ============================================================================

#[ic_cdk::update]
fn capsules_create() -> CapsuleId {
    capsule::capsules_create(caller(), &IcClock)
}

// ============================================================================
// CHUNKED UPLOAD (§4.1, §4.2)
// ============================================================================

/// Client-facing limits, for TypeScript client discoverability.
#[derive(candid::CandidType, serde::Deserialize)]
struct UploadConfig {
    chunk_size_max: u32,
    max_chunks: u32,
    inline_max: u32,
    session_idle_ttl_ns: u64,
}

#[ic_cdk::query]
fn upload_config() -> UploadConfig {
    use upload::{CHUNK_SIZE_MAX, INLINE_MAX, MAX_CHUNKS, SESSION_IDLE_TTL_NS};
    UploadConfig {
        chunk_size_max: CHUNK_SIZE_MAX as u32,
        max_chunks: MAX_CHUNKS,
        inline_max: INLINE_MAX as u32,
        session_idle_ttl_ns: SESSION_IDLE_TTL_NS,
    }
}

/// Outcome of `uploads_begin`, flattened to candid: a fresh/replayed
/// session, or the terminal outcome of an idempotency replay (§3 S2).
#[derive(candid::CandidType, serde::Deserialize)]
enum UploadsBeginResult {
    Session { session_id: u64 },
    AlreadyCommitted { blob_id: String },
    AlreadyAborted,
}

#[ic_cdk::update]
fn uploads_begin(
    capsule_id: CapsuleId,
    chunk_count: u32,
    idem: String,
) -> Result<UploadsBeginResult, Error> {
    let sessions = SessionStore::new();
    let auth = CapsuleOwnerHook {
        capsules: &CapsuleStore::new(),
    };
    let outcome = upload::uploads_begin(
        caller(),
        capsule_id,
        chunk_count,
        idem,
        &auth,
        &sessions,
        &IcClock,
    )?;
    Ok(match outcome {
        BeginOutcome::Session(SessionId(id)) => UploadsBeginResult::Session { session_id: id },
        BeginOutcome::AlreadyCommitted { blob_id } => UploadsBeginResult::AlreadyCommitted {
            blob_id: blob_id.to_string(),
        },
        BeginOutcome::AlreadyAborted => UploadsBeginResult::AlreadyAborted,
    })
}

#[ic_cdk::update]
fn uploads_put_chunk(session_id: u64, index: u32, bytes: Vec<u8>) -> Result<(), Error> {
    let sessions = SessionStore::new();
    let chunks = ChunkStore::new();
    let auth = CapsuleOwnerHook {
        capsules: &CapsuleStore::new(),
    };
    upload::uploads_put_chunk(
        caller(),
        SessionId(session_id),
        index,
        bytes,
        &auth,
        &sessions,
        &chunks,
        &IcClock,
    )
}

#[ic_cdk::update]
fn uploads_finish(
    session_id: u64,
    expected_sha256: Vec<u8>,
    expected_len: u64,
) -> Result<UploadFinishResult, Error> {
    let hash: [u8; 32] = expected_sha256
        .try_into()
        .map_err(|_| Error::InvalidArgument("expected_sha256 must be 32 bytes".into()))?;
    let sessions = SessionStore::new();
    let chunks = ChunkStore::new();
    let blobs = BlobRegistry::new();
    let auth = CapsuleOwnerHook {
        capsules: &CapsuleStore::new(),
    };
    upload::uploads_finish(
        caller(),
        SessionId(session_id),
        hash,
        expected_len,
        &auth,
        &sessions,
        &chunks,
        &blobs,
        &IcClock,
    )
}

#[ic_cdk::update]
fn uploads_abort(session_id: u64) -> Result<(), Error> {
    let sessions = SessionStore::new();
    let chunks = ChunkStore::new();
    let auth = CapsuleOwnerHook {
        capsules: &CapsuleStore::new(),
    };
    upload::uploads_abort(
        caller(),
        SessionId(session_id),
        &auth,
        &sessions,
        &chunks,
        &IcClock,
    )
}

// ============================================================================
// BLOB READ & DELETE (§4.3)
// ============================================================================

/// Parses a client-supplied locator, rejecting the `inline_` family
/// distinctly from a malformed blob id (§8 boundary behavior).
fn parse_blob_locator(locator: &str) -> Result<BlobId, Error> {
    if locator.starts_with("inline_") {
        return Err(Error::InvalidArgument(
            "locator refers to an inline asset, not a blob".into(),
        ));
    }
    locator
        .parse::<BlobId>()
        .map_err(Error::InvalidArgument)
}

#[ic_cdk::query]
fn blob_get_meta(blob_id: String) -> Result<BlobMeta, Error> {
    let id = parse_blob_locator(&blob_id)?;
    BlobRegistry::new().get_meta(id)
}

#[ic_cdk::query]
fn blob_read_chunk(blob_id: String, index: u32) -> Result<Vec<u8>, Error> {
    let id = parse_blob_locator(&blob_id)?;
    let meta = BlobRegistry::new().get_meta(id)?;
    if index >= meta.chunk_count {
        return Err(Error::OutOfRange(format!(
            "index {index} >= chunk_count {}",
            meta.chunk_count
        )));
    }
    ChunkStore::new()
        .get_blob_chunk(id, index)
        .ok_or(Error::NotFound)
}

#[ic_cdk::query]
fn blob_read(blob_id: String) -> Result<Vec<u8>, Error> {
    let id = parse_blob_locator(&blob_id)?;
    let chunks = ChunkStore::new();
    let meta = BlobRegistry::new().get_meta(id)?;
    let mut out = Vec::with_capacity(meta.size as usize);
    for i in 0..meta.chunk_count {
        let chunk = chunks.get_blob_chunk(id, i).ok_or(Error::NotFound)?;
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

#[ic_cdk::update]
fn blob_delete(blob_id: String) -> Result<(), Error> {
    let id = parse_blob_locator(&blob_id)?;
    BlobRegistry::new().delete(id)
}

// ============================================================================
// MEMORIES (§4.4, §4.5)
// ============================================================================

#[ic_cdk::update]
fn memories_create_with_internal_blobs_and_inline_assets(
    capsule_id: CapsuleId,
    memory_metadata: MemoryMetadata,
    blob_assets: Vec<InternalBlobAsset>,
    inline_assets: Vec<InlineAsset>,
    idem: String,
) -> Result<MemoryId, Error> {
    let memories = MemoryStore::new();
    let blobs = BlobRegistry::new();
    let auth = CapsuleOwnerHook {
        capsules: &CapsuleStore::new(),
    };
    memories::memories_create_with_internal_blobs_and_inline_assets(
        caller(),
        capsule_id,
        memory_metadata,
        blob_assets,
        inline_assets,
        idem,
        &auth,
        &memories,
        &blobs,
        &IcClock,
    )
}

#[ic_cdk::update]
#[allow(clippy::too_many_arguments)]
fn memories_create(
    capsule_id: CapsuleId,
    inline: Option<Vec<u8>>,
    blob_ref: Option<String>,
    asset_metadata: AssetMetadata,
    memory_metadata: MemoryMetadata,
    idem: String,
) -> Result<MemoryId, Error> {
    let blob_ref = blob_ref
        .map(|s| s.parse::<BlobId>().map_err(Error::InvalidArgument))
        .transpose()?;
    let memories = MemoryStore::new();
    let blobs = BlobRegistry::new();
    let auth = CapsuleOwnerHook {
        capsules: &CapsuleStore::new(),
    };
    memories::memories_create(
        caller(),
        capsule_id,
        inline,
        blob_ref,
        asset_metadata,
        memory_metadata,
        idem,
        &auth,
        &memories,
        &blobs,
        &IcClock,
    )
}

#[ic_cdk::query]
fn memories_read(memory_id: MemoryId) -> Result<MemoryRecord, Error> {
    memories::memories_read(&memory_id, &MemoryStore::new())
}

#[ic_cdk::update]
fn memories_delete(memory_id: MemoryId, delete_assets: bool) -> Result<(), Error> {
    let memories = MemoryStore::new();
    let blobs = BlobRegistry::new();
    let auth = CapsuleOwnerHook {
        capsules: &CapsuleStore::new(),
    };
    memories::memories_delete(caller(), &memory_id, delete_assets, &auth, &memories, &blobs)
}

#[ic_cdk::query]
fn whoami() -> Principal {
    caller()
}

/// Live counts across the stores, for canister size diagnostics.
#[derive(candid::CandidType, serde::Deserialize)]
struct CoreStats {
    live_blobs: u64,
    in_flight_sessions: u64,
}

#[ic_cdk::query]
fn core_stats() -> CoreStats {
    CoreStats {
        live_blobs: BlobRegistry::new().count(),
        in_flight_sessions: SessionStore::new().total_count(),
    }
}

// ============================================================================
// DEBUG ENDPOINTS (dev only)
// ============================================================================

/// Computes the hex-encoded SHA-256 of the given bytes, so a client can
/// verify the `expected_sha256` it's about to pass to `uploads_finish`
/// without shipping its own hashing implementation.
#[ic_cdk::query]
fn debug_sha256(bytes: Vec<u8>) -> String {
    use sha2::{Digest, Sha256};
    let hash = Sha256::digest(&bytes);
    hex::encode(hash)
}

ic_cdk::export_candid!();
