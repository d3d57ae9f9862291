//! Memory aggregate types (§3, §4.4). `AssetMetadata` is deliberately thin:
//! the core validates only what it needs to (name, mime type) and
//! round-trips everything else verbatim, per the spec's Open Questions —
//! the shape is opaque to us, not ours to enrich.

use crate::types::{CapsuleId, Error, MemoryId};
use crate::upload::types::{BlobId, INLINE_MAX};
use candid::{CandidType, Decode, Deserialize, Encode};
use ic_stable_structures::{storable::Bound, Storable};
use serde::Serialize;
use std::borrow::Cow;

/// Per-asset metadata. `extra` carries whatever additional typed fields a
/// caller sent that this core doesn't interpret (§9 Open Questions).
#[derive(Clone, Debug, CandidType, Deserialize, Serialize, PartialEq, Default)]
pub struct AssetMetadata {
    pub name: String,
    pub mime_type: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub extra: Option<String>,
}

/// Memory-level metadata, stored and returned verbatim.
#[derive(Clone, Debug, CandidType, Deserialize, Serialize, PartialEq, Default)]
pub struct MemoryMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub extra: Option<String>,
}

/// A memory-owned reference to a live blob in the Blob Registry (§3
/// `InternalBlobAsset`).
#[derive(Clone, Debug, CandidType, Deserialize, Serialize, PartialEq)]
pub struct InternalBlobAsset {
    pub blob_id: BlobId,
    pub asset_metadata: AssetMetadata,
}

/// Bytes embedded directly in the memory record (§3 `InlineAsset`),
/// bounded by `INLINE_MAX`.
#[derive(Clone, Debug, CandidType, Deserialize, Serialize, PartialEq)]
pub struct InlineAsset {
    pub bytes: Vec<u8>,
    pub asset_metadata: AssetMetadata,
}

impl InlineAsset {
    pub fn validate(&self) -> Result<(), Error> {
        if self.bytes.len() > INLINE_MAX {
            return Err(Error::TooLarge(format!(
                "inline asset {} bytes exceeds INLINE_MAX {INLINE_MAX}",
                self.bytes.len()
            )));
        }
        Ok(())
    }
}

/// The user-visible aggregate (§3 `MemoryRecord`).
#[derive(Clone, Debug, CandidType, Deserialize, Serialize, PartialEq)]
pub struct MemoryRecord {
    pub memory_id: MemoryId,
    pub capsule_id: CapsuleId,
    pub metadata: MemoryMetadata,
    pub blob_internal_assets: Vec<InternalBlobAsset>,
    pub inline_assets: Vec<InlineAsset>,
    pub created_at: u64,
    pub deleted_at: Option<u64>,
}

impl Storable for MemoryRecord {
    const BOUND: Bound = Bound::Unbounded;

    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(Encode!(&(1u16, self)).expect("encode MemoryRecord"))
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        let (version, record): (u16, MemoryRecord) =
            Decode!(bytes.as_ref(), (u16, MemoryRecord)).expect("decode MemoryRecord");
        assert_eq!(version, 1, "unsupported MemoryRecord version");
        record
    }
}

#[derive(Clone, Debug, CandidType, Deserialize, Serialize)]
pub struct MemoryIdemRecord {
    pub memory_id: MemoryId,
    pub recorded_at: u64,
}

impl Storable for MemoryIdemRecord {
    const BOUND: Bound = Bound::Bounded {
        max_size: 128,
        is_fixed_size: false,
    };

    fn to_bytes(&self) -> Cow<'_, [u8]> {
        Cow::Owned(Encode!(&(1u16, self)).expect("encode MemoryIdemRecord"))
    }

    fn from_bytes(bytes: Cow<[u8]>) -> Self {
        let (version, rec): (u16, MemoryIdemRecord) =
            Decode!(bytes.as_ref(), (u16, MemoryIdemRecord)).expect("decode MemoryIdemRecord");
        assert_eq!(version, 1, "unsupported MemoryIdemRecord version");
        rec
    }
}
