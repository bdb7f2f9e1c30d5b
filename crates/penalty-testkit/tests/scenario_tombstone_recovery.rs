//! Soft delete and tombstone recovery
//!
//! GREEN when:
//! - Delete with the current hash disables the record and moves its hash.
//! - Delete with a payload that does not match the presented hash conflicts.
//! - A disabled record is still readable (with `Enabled = false`).
//! - A blind app write over a tombstone recovers it, taking the requested flag.
//! - A hash-matched app update of a tombstone does not re-enable it.

use penalty_engine::EngineError;
use penalty_schemas::{Origin, PenaltyType};
use penalty_testkit::{edit_of, sample_document, Harness};

#[tokio::test]
async fn delete_then_blind_app_write_recovers() {
    let h = Harness::new();
    let created = h
        .service
        .create_document(sample_document("2001", PenaltyType::Fpn))
        .await
        .unwrap();

    let deleted = h
        .service
        .delete_document(&created.id, edit_of(&created, Origin::App, Some(&created.hash)))
        .await
        .unwrap();
    assert!(!deleted.enabled);
    assert_ne!(deleted.hash, created.hash);

    let read = h.service.get_document(&created.id).await.unwrap();
    assert!(!read.enabled);

    let mut recover = edit_of(&created, Origin::App, None);
    recover.enabled = Some(true);
    let recovered = h.service.update_document(recover).await.unwrap();
    assert!(recovered.enabled);
    assert!(recovered.offset > deleted.offset);
}

#[tokio::test]
async fn delete_with_tampered_payload_conflicts() {
    let h = Harness::new();
    let created = h
        .service
        .create_document(sample_document("2002", PenaltyType::Im))
        .await
        .unwrap();

    let mut body = edit_of(&created, Origin::App, Some(&created.hash));
    body.value.penalty_amount = Some(1);
    let err = h.service.delete_document(&created.id, body).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict { .. }));

    let no_hash = edit_of(&created, Origin::App, None);
    let err = h.service.delete_document(&created.id, no_hash).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    assert!(h.service.get_document(&created.id).await.unwrap().enabled);
}

#[tokio::test]
async fn second_delete_with_old_hash_conflicts() {
    let h = Harness::new();
    let created = h
        .service
        .create_document(sample_document("2003", PenaltyType::Cdn))
        .await
        .unwrap();
    let body = edit_of(&created, Origin::App, Some(&created.hash));

    h.service
        .delete_document(&created.id, body.clone())
        .await
        .unwrap();
    let err = h.service.delete_document(&created.id, body).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict { .. }));
}

#[tokio::test]
async fn hash_matched_update_keeps_tombstone_disabled() {
    let h = Harness::new();
    let created = h
        .service
        .create_document(sample_document("2004", PenaltyType::Fpn))
        .await
        .unwrap();
    let deleted = h
        .service
        .delete_document(&created.id, edit_of(&created, Origin::App, Some(&created.hash)))
        .await
        .unwrap();

    let mut edit = edit_of(&deleted, Origin::App, Some(&deleted.hash));
    edit.enabled = Some(true);
    edit.value.penalty_amount = Some(175);
    let updated = h.service.update_document(edit).await.unwrap();
    assert!(!updated.enabled);
    assert_eq!(updated.value.penalty_amount, Some(175));
}
