//! Reads reflect the oracle without writing back
//!
//! GREEN when:
//! - A read overwrites cached payment fields from the oracle.
//! - An ID absent from the oracle reads as `UNPAID`, stale cached fields cleared.
//! - Reads perform no store writes; the stored payload keeps no oracle fields.
//! - Decoration does not move the version hash a client must present back.
//! - An oracle outage fails the read as retryable.

use penalty_engine::EngineError;
use penalty_schemas::{Origin, PaymentStatus, PenaltyType};
use penalty_store::ItemStore;
use penalty_testkit::{edit_of, sample_document, Harness};

#[tokio::test]
async fn read_overlays_oracle_state_and_never_writes() {
    let h = Harness::new();
    let created = h
        .service
        .create_document(sample_document("5001", PenaltyType::Fpn))
        .await
        .unwrap();
    assert_eq!(created.value.payment_status, Some(PaymentStatus::Unpaid));

    h.oracle.set_paid(&created.id, "PAY-5001");
    let writes = h.document_writes();

    let read = h.service.get_document(&created.id).await.unwrap();
    assert_eq!(read.value.payment_status, Some(PaymentStatus::Paid));
    assert_eq!(read.value.payment_ref.as_deref(), Some("PAY-5001"));
    assert_eq!(read.hash, created.hash);
    assert_eq!(h.document_writes(), writes);

    let stored = h.documents.get(&created.id).await.unwrap().unwrap();
    assert_eq!(stored.value.payment_status, None);
    assert_eq!(stored.value.payment_ref, None);

    // The decorated body is accepted back as-is.
    let mut edit = edit_of(&read, Origin::App, Some(&read.hash));
    edit.value.penalty_amount = Some(80);
    h.service.update_document(edit).await.unwrap();
}

#[tokio::test]
async fn oracle_absence_clears_stale_cached_fields() {
    let h = Harness::new();
    let created = h
        .service
        .create_document(sample_document("5002", PenaltyType::Im))
        .await
        .unwrap();
    h.service
        .apply_payment(penalty_schemas::PaymentInfo {
            id: created.id.clone(),
            payment_status: PaymentStatus::Paid,
            payment_detail: Default::default(),
            penalty_amount: None,
            vehicle_registration: None,
        })
        .await
        .unwrap();

    // Stored cache says paid; the oracle has never heard of it.
    let read = h.service.get_document(&created.id).await.unwrap();
    assert_eq!(read.value.payment_status, Some(PaymentStatus::Unpaid));
}

#[tokio::test]
async fn list_and_search_are_decorated_and_paged() {
    let h = Harness::new();
    for r in ["5101", "5102", "5103"] {
        h.service
            .create_document(sample_document(r, PenaltyType::Fpn))
            .await
            .unwrap();
    }
    h.oracle.set_paid("5102_FPN", "PAY-5102");

    let first = h.service.list_documents(0.0, None, Some(2)).await.unwrap();
    assert_eq!(first.items.len(), 2);
    let next = first.next.clone().expect("more pages");
    let second = h
        .service
        .list_documents(0.0, Some(next), Some(2))
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(second.next.is_none());

    let all: Vec<_> = first.items.iter().chain(&second.items).collect();
    assert!(all.windows(2).all(|w| w[0].offset < w[1].offset));
    let paid = all.iter().find(|r| r.id == "5102_FPN").unwrap();
    assert_eq!(paid.value.payment_status, Some(PaymentStatus::Paid));

    let by_reg = h
        .service
        .search_by_registration("ab12cde", None, None)
        .await
        .unwrap();
    assert_eq!(by_reg.items.len(), 3);

    let err = h
        .service
        .search_by_registration("   ", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn oracle_outage_fails_reads() {
    let h = Harness::new();
    let created = h
        .service
        .create_document(sample_document("5003", PenaltyType::Cdn))
        .await
        .unwrap();
    h.oracle.set_failing(true);

    let err = h.service.get_document(&created.id).await.unwrap_err();
    assert!(err.is_retryable());

    let missing = h.service.get_document("nope_FPN").await;
    assert!(matches!(missing, Err(EngineError::NotFound(_))));
}
