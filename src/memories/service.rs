//! Memory Store + Reference Manager orchestration (§4.4, §4.5 of the
//! spec's component table): atomic multi-asset creation, cascade vs.
//! selective deletion, and the ref-counting that keeps blobs alive exactly
//! as long as something points at them.

use crate::auth::AuthorizationHook;
use crate::clock::Clock;
use crate::types::{CapsuleId, Error, MemoryId};
use crate::upload::blob_registry::BlobRegistry;
use crate::memories::store::MemoryStore;
use crate::memories::types::{
    InlineAsset, InternalBlobAsset, MemoryIdemRecord, MemoryMetadata, MemoryRecord,
};
use candid::Principal;

/// `memories_create_with_internal_blobs_and_inline_assets` (§4.4). All
/// increfs happen before the record is persisted (§3 M1): either every
/// listed blob is live, in the same capsule, and gets its ref bumped, or
/// nothing changes.
#[allow(clippy::too_many_arguments)]
pub fn memories_create_with_internal_blobs_and_inline_assets(
    caller: Principal,
    capsule_id: CapsuleId,
    memory_metadata: MemoryMetadata,
    blob_assets: Vec<InternalBlobAsset>,
    inline_assets: Vec<InlineAsset>,
    idem: String,
    auth: &impl AuthorizationHook,
    memories: &MemoryStore,
    blobs: &BlobRegistry,
    clock: &impl Clock,
) -> Result<MemoryId, Error> {
    if !auth.may_write(caller, &capsule_id) {
        return Err(Error::Unauthorized);
    }
    if let Some(rec) = memories.find_idem(&capsule_id, caller, &idem) {
        return Ok(rec.memory_id);
    }
    for asset in &inline_assets {
        asset.validate()?;
    }

    // Validate every blob reference up front so a partial incref never
    // happens (§3 M1).
    for asset in &blob_assets {
        let meta = blobs.get_meta(asset.blob_id)?;
        if meta.capsule_id != capsule_id {
            return Err(Error::InvalidArgument(format!(
                "blob {} belongs to a different capsule",
                asset.blob_id
            )));
        }
    }

    for asset in &blob_assets {
        blobs.incref(asset.blob_id, 1)?;
    }

    let memory_id = memories.alloc_id();
    let now = clock.now_ns();
    memories.insert(MemoryRecord {
        memory_id: memory_id.clone(),
        capsule_id: capsule_id.clone(),
        metadata: memory_metadata,
        blob_internal_assets: blob_assets,
        inline_assets,
        created_at: now,
        deleted_at: None,
    });
    memories.put_idem(
        &capsule_id,
        caller,
        &idem,
        MemoryIdemRecord {
            memory_id: memory_id.clone(),
            recorded_at: now,
        },
    );

    Ok(memory_id)
}

/// Legacy single-asset creation form (§4.4): exactly one of `inline` or
/// `blob_ref` must be given, and it produces the same memory shape as the
/// general form with a single-element asset list.
#[allow(clippy::too_many_arguments)]
pub fn memories_create(
    caller: Principal,
    capsule_id: CapsuleId,
    inline: Option<Vec<u8>>,
    blob_ref: Option<crate::upload::types::BlobId>,
    asset_metadata: crate::memories::types::AssetMetadata,
    memory_metadata: MemoryMetadata,
    idem: String,
    auth: &impl AuthorizationHook,
    memories: &MemoryStore,
    blobs: &BlobRegistry,
    clock: &impl Clock,
) -> Result<MemoryId, Error> {
    let (blob_assets, inline_assets) = match (inline, blob_ref) {
        (Some(bytes), None) => (
            vec![],
            vec![InlineAsset {
                bytes,
                asset_metadata,
            }],
        ),
        (None, Some(blob_id)) => (
            vec![InternalBlobAsset {
                blob_id,
                asset_metadata,
            }],
            vec![],
        ),
        _ => {
            return Err(Error::InvalidArgument(
                "exactly one of inline or blob_ref must be given".into(),
            ))
        }
    };
    memories_create_with_internal_blobs_and_inline_assets(
        caller,
        capsule_id,
        memory_metadata,
        blob_assets,
        inline_assets,
        idem,
        auth,
        memories,
        blobs,
        clock,
    )
}

pub fn memories_read(memory_id: &MemoryId, memories: &MemoryStore) -> Result<MemoryRecord, Error> {
    memories.get(memory_id).ok_or(Error::NotFound)
}

/// `memories_delete` (§4.4, invariant M3): every referenced blob is
/// decremented once; `delete_assets` additionally reclaims any blob whose
/// count reaches zero as a result of *this* call. A blob that was already
/// at zero, or shared with other live memories, is left exactly as ref
/// counting dictates.
pub fn memories_delete(
    caller: Principal,
    memory_id: &MemoryId,
    delete_assets: bool,
    auth: &impl AuthorizationHook,
    memories: &MemoryStore,
    blobs: &BlobRegistry,
) -> Result<(), Error> {
    let record = memories.get(memory_id).ok_or(Error::NotFound)?;
    if !auth.may_write(caller, &record.capsule_id) {
        return Err(Error::Unauthorized);
    }

    for asset in &record.blob_internal_assets {
        let remaining = blobs.decref(asset.blob_id, 1)?;
        if delete_assets && remaining == 0 {
            blobs.delete_if_unreferenced(asset.blob_id)?;
        }
    }

    memories.remove(memory_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::AllowAll;
    use crate::clock::test_support::FakeClock;
    use crate::memories::types::AssetMetadata;
    use crate::upload::types::{BlobMeta, INLINE_MAX};

    fn setup() -> (MemoryStore, BlobRegistry, FakeClock, Principal) {
        (
            MemoryStore::new(),
            BlobRegistry::new(),
            FakeClock::new(1),
            Principal::anonymous(),
        )
    }

    fn seed_blob(blobs: &BlobRegistry, capsule_id: &str) -> crate::upload::types::BlobId {
        let id = blobs.alloc_id();
        blobs.insert(
            id,
            BlobMeta {
                capsule_id: capsule_id.to_string(),
                size: 10,
                sha256: [0u8; 32],
                chunk_count: 1,
                chunk_size: 10,
                uploaded_at: 1,
                ref_count: 0,
                deleted_at: None,
            },
        );
        id
    }

    fn meta(name: &str) -> AssetMetadata {
        AssetMetadata {
            name: name.into(),
            mime_type: "application/octet-stream".into(),
            description: None,
            tags: vec![],
            extra: None,
        }
    }

    #[test]
    fn scenario_f_mixed_asset_memory_round_trips_in_order() {
        let (memories, blobs, clock, caller) = setup();
        let blob_id = seed_blob(&blobs, "cap1");
        let memory_id = memories_create_with_internal_blobs_and_inline_assets(
            caller,
            "cap1".into(),
            MemoryMetadata::default(),
            vec![InternalBlobAsset {
                blob_id,
                asset_metadata: meta("photo.bin"),
            }],
            vec![InlineAsset {
                bytes: vec![1u8; 500],
                asset_metadata: meta("note.txt"),
            }],
            "f".into(),
            &AllowAll,
            &memories,
            &blobs,
            &clock,
        )
        .unwrap();

        let record = memories_read(&memory_id, &memories).unwrap();
        assert_eq!(record.blob_internal_assets.len(), 1);
        assert_eq!(record.inline_assets.len(), 1);
        assert_eq!(record.blob_internal_assets[0].blob_id, blob_id);
        assert_eq!(blobs.get_meta(blob_id).unwrap().ref_count, 1);

        memories_delete(caller, &memory_id, true, &AllowAll, &memories, &blobs).unwrap();
        assert!(matches!(blobs.get_meta(blob_id), Err(Error::NotFound)));
        assert!(memories_read(&memory_id, &memories).is_err());
    }

    #[test]
    fn scenario_e_cascade_vs_selective_deletion() {
        let (memories, blobs, clock, caller) = setup();
        let shared_blob = seed_blob(&blobs, "cap1");
        let exclusive_blob = seed_blob(&blobs, "cap1");

        let m = memories_create_with_internal_blobs_and_inline_assets(
            caller,
            "cap1".into(),
            MemoryMetadata::default(),
            vec![
                InternalBlobAsset {
                    blob_id: exclusive_blob,
                    asset_metadata: meta("a"),
                },
                InternalBlobAsset {
                    blob_id: shared_blob,
                    asset_metadata: meta("b"),
                },
            ],
            vec![],
            "m".into(),
            &AllowAll,
            &memories,
            &blobs,
            &clock,
        )
        .unwrap();
        let m_prime = memories_create_with_internal_blobs_and_inline_assets(
            caller,
            "cap1".into(),
            MemoryMetadata::default(),
            vec![InternalBlobAsset {
                blob_id: shared_blob,
                asset_metadata: meta("b2"),
            }],
            vec![],
            "mp".into(),
            &AllowAll,
            &memories,
            &blobs,
            &clock,
        )
        .unwrap();
        assert_eq!(blobs.get_meta(shared_blob).unwrap().ref_count, 2);

        memories_delete(caller, &m, true, &AllowAll, &memories, &blobs).unwrap();
        assert!(matches!(blobs.get_meta(exclusive_blob), Err(Error::NotFound)));
        assert_eq!(blobs.get_meta(shared_blob).unwrap().ref_count, 1);

        memories_delete(caller, &m_prime, false, &AllowAll, &memories, &blobs).unwrap();
        let remaining = blobs.get_meta(shared_blob).unwrap();
        assert_eq!(remaining.ref_count, 0);
    }

    #[test]
    fn create_rejects_cross_capsule_blob_without_side_effects() {
        let (memories, blobs, clock, caller) = setup();
        let blob_id = seed_blob(&blobs, "cap_other");
        let err = memories_create_with_internal_blobs_and_inline_assets(
            caller,
            "cap1".into(),
            MemoryMetadata::default(),
            vec![InternalBlobAsset {
                blob_id,
                asset_metadata: meta("x"),
            }],
            vec![],
            "cross".into(),
            &AllowAll,
            &memories,
            &blobs,
            &clock,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(blobs.get_meta(blob_id).unwrap().ref_count, 0);
    }

    #[test]
    fn idempotent_create_does_not_double_incref() {
        let (memories, blobs, clock, caller) = setup();
        let blob_id = seed_blob(&blobs, "cap1");
        let asset = InternalBlobAsset {
            blob_id,
            asset_metadata: meta("x"),
        };
        let m1 = memories_create_with_internal_blobs_and_inline_assets(
            caller,
            "cap1".into(),
            MemoryMetadata::default(),
            vec![asset.clone()],
            vec![],
            "idem".into(),
            &AllowAll,
            &memories,
            &blobs,
            &clock,
        )
        .unwrap();
        let m2 = memories_create_with_internal_blobs_and_inline_assets(
            caller,
            "cap1".into(),
            MemoryMetadata::default(),
            vec![asset],
            vec![],
            "idem".into(),
            &AllowAll,
            &memories,
            &blobs,
            &clock,
        )
        .unwrap();
        assert_eq!(m1, m2);
        assert_eq!(blobs.get_meta(blob_id).unwrap().ref_count, 1);
    }

    #[test]
    fn inline_asset_over_limit_is_rejected() {
        let (memories, blobs, clock, caller) = setup();
        let err = memories_create_with_internal_blobs_and_inline_assets(
            caller,
            "cap1".into(),
            MemoryMetadata::default(),
            vec![],
            vec![InlineAsset {
                bytes: vec![0u8; INLINE_MAX + 1],
                asset_metadata: meta("big"),
            }],
            "big".into(),
            &AllowAll,
            &memories,
            &blobs,
            &clock,
        )
        .unwrap_err();
        assert!(matches!(err, Error::TooLarge(_)));
    }
}
