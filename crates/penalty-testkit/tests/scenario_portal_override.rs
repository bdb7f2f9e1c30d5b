//! Portal authority over app writes
//!
//! GREEN when:
//! - A portal update is accepted whatever hash it presents.
//! - A portal update of a tombstone keeps the record disabled.
//! - After a portal write, an app update presenting the pre-portal hash conflicts.

use penalty_engine::EngineError;
use penalty_schemas::{Origin, PenaltyType};
use penalty_testkit::{edit_of, sample_document, Harness};

#[tokio::test]
async fn portal_write_wins_over_any_hash() {
    let h = Harness::new();
    let created = h
        .service
        .create_document(sample_document("3001", PenaltyType::Fpn))
        .await
        .unwrap();

    let mut portal = edit_of(&created, Origin::Portal, Some("not-a-real-hash"));
    portal.value.penalty_amount = Some(60);
    let written = h.service.update_document(portal).await.unwrap();
    assert_eq!(written.origin, Origin::Portal);
    assert_eq!(written.value.penalty_amount, Some(60));

    let mut app = edit_of(&created, Origin::App, Some(&created.hash));
    app.value.penalty_amount = Some(70);
    let err = h.service.update_document(app).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict { .. }));

    let read = h.service.get_document(&created.id).await.unwrap();
    assert_eq!(read.value.penalty_amount, Some(60));
}

#[tokio::test]
async fn portal_write_does_not_resurrect_a_tombstone() {
    let h = Harness::new();
    let created = h
        .service
        .create_document(sample_document("3002", PenaltyType::Im))
        .await
        .unwrap();
    h.service
        .delete_document(&created.id, edit_of(&created, Origin::App, Some(&created.hash)))
        .await
        .unwrap();

    let mut portal = edit_of(&created, Origin::Portal, None);
    portal.enabled = Some(true);
    let written = h.service.update_document(portal).await.unwrap();
    assert!(!written.enabled);
}

#[tokio::test]
async fn portal_write_to_unknown_id_inserts() {
    let h = Harness::new();
    let mut doc = sample_document("3003", PenaltyType::Cdn);
    doc.origin = Some(Origin::Portal);
    doc.hash = Some("anything".into());

    let written = h.service.update_document(doc).await.unwrap();
    assert!(written.enabled);
    assert_eq!(written.origin, Origin::Portal);
}
