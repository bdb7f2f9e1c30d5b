//! Paid records are not removable
//!
//! GREEN when:
//! - Deleting a record the oracle reports as paid is a conflict.
//! - The refused delete performs no store write and leaves the record enabled.
//! - An oracle outage fails the delete as retryable, again with no write.

use penalty_engine::EngineError;
use penalty_schemas::{Origin, PaymentStatus, PenaltyType};
use penalty_testkit::{edit_of, sample_document, Harness};

#[tokio::test]
async fn delete_of_paid_record_is_refused_without_writing() {
    let h = Harness::new();
    let created = h
        .service
        .create_document(sample_document("4001", PenaltyType::Fpn))
        .await
        .unwrap();
    h.oracle.set_paid(&created.id, "PAY-1");

    let writes = h.document_writes();
    let err = h
        .service
        .delete_document(&created.id, edit_of(&created, Origin::App, Some(&created.hash)))
        .await
        .unwrap_err();

    assert!(
        matches!(&err, EngineError::Conflict { reason, .. } if reason.contains("paid")),
        "got {err:?}"
    );
    assert_eq!(h.document_writes(), writes);

    let read = h.service.get_document(&created.id).await.unwrap();
    assert!(read.enabled);
    assert_eq!(read.value.payment_status, Some(PaymentStatus::Paid));
}

#[tokio::test]
async fn oracle_outage_fails_delete_as_retryable() {
    let h = Harness::new();
    let created = h
        .service
        .create_document(sample_document("4002", PenaltyType::Im))
        .await
        .unwrap();
    h.oracle.set_failing(true);

    let writes = h.document_writes();
    let err = h
        .service
        .delete_document(&created.id, edit_of(&created, Origin::App, Some(&created.hash)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Upstream(_)));
    assert!(err.is_retryable());
    assert_eq!(h.document_writes(), writes);
}
