//! Batch operations answer per item, in input order
//!
//! GREEN when:
//! - A batch update mixing accepted and rejected items reports each at its
//!   own position, and the rejected item does not block the others.
//! - A batch read returns stored records in input order and omits unknown IDs.
//! - A batch reversal reports a missing ID at its position.

use penalty_engine::EngineError;
use penalty_schemas::{Origin, PaymentStatus, PenaltyType};
use penalty_testkit::{edit_of, sample_document, Harness};

#[tokio::test]
async fn batch_update_reports_per_item_in_order() {
    let h = Harness::new();
    let a = h
        .service
        .create_document(sample_document("9001", PenaltyType::Fpn))
        .await
        .unwrap();
    let b = h
        .service
        .create_document(sample_document("9002", PenaltyType::Fpn))
        .await
        .unwrap();

    let mut good = edit_of(&a, Origin::App, Some(&a.hash));
    good.value.penalty_amount = Some(10);
    let stale = edit_of(&b, Origin::App, Some("stale"));
    let fresh = sample_document("9003", PenaltyType::Cdn);

    let results = h
        .service
        .update_documents(vec![good, stale, fresh])
        .await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().value.penalty_amount, Some(10));
    assert!(matches!(results[1], Err(EngineError::Conflict { .. })));
    assert_eq!(results[2].as_ref().unwrap().id, "9003_CDN");
}

#[tokio::test]
async fn batch_read_keeps_input_order_and_omits_unknown() {
    let h = Harness::new();
    for r in ["9101", "9102", "9103"] {
        h.service
            .create_document(sample_document(r, PenaltyType::Im))
            .await
            .unwrap();
    }
    h.oracle.set_paid("9101_IM", "PAY-9101");

    let ids = vec![
        "9103_IM".to_string(),
        "missing_IM".to_string(),
        "9101_IM".to_string(),
    ];
    let got = h.service.get_documents(&ids).await.unwrap();
    let got_ids: Vec<&str> = got.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(got_ids, ["9103_IM", "9101_IM"]);
    assert_eq!(got[1].value.payment_status, Some(PaymentStatus::Paid));
    assert_eq!(got[0].value.payment_status, Some(PaymentStatus::Unpaid));
}

#[tokio::test]
async fn batch_reversal_reports_missing_ids_in_place() {
    let h = Harness::new();
    for r in ["9201", "9202"] {
        h.service
            .create_document(sample_document(r, PenaltyType::Fpn))
            .await
            .unwrap();
    }

    let ids = vec![
        "9201_FPN".to_string(),
        "nope_FPN".to_string(),
        "9202_FPN".to_string(),
    ];
    let out = h.service.reverse_payments(&ids).await;
    assert!(out.results[0].is_ok());
    assert!(matches!(out.results[1], Err(EngineError::NotFound(_))));
    assert!(out.results[2].is_ok());
    assert!(out.group.is_none(), "ungrouped records never cascade");
}
