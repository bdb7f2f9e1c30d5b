//! Reversal inside a group
//!
//! GREEN when:
//! - Reversing one member of a paid group through the batch reversal path
//!   reverts the group to `UNPAID`.
//! - Reversing a whole type through the group path does the same.
//! - Reversing a member of an already unpaid group leaves the group as stored.

use penalty_schemas::{GroupPaymentInfo, PaymentDetail, PaymentStatus, PenaltyType};
use penalty_testkit::{sample_group, Harness};

fn pay(penalty_type: PenaltyType) -> GroupPaymentInfo {
    GroupPaymentInfo {
        penalty_type,
        payment_status: PaymentStatus::Paid,
        payment_detail: PaymentDetail::default(),
    }
}

async fn paid_group(h: &Harness, reference: &str) -> String {
    let view = h
        .service
        .create_group(sample_group(reference, &[PenaltyType::Fpn, PenaltyType::Im]))
        .await
        .unwrap();
    for t in [PenaltyType::Fpn, PenaltyType::Im] {
        h.service
            .apply_group_payment(&view.group.id, pay(t))
            .await
            .unwrap();
    }
    view.group.id
}

#[tokio::test]
async fn member_reversal_cascades_to_group() {
    let h = Harness::new();
    let gid = paid_group(&h, "7101").await;

    let out = h
        .service
        .reverse_payments(&["7101_FPN".to_string()])
        .await;
    let reversed = out.results[0].as_ref().unwrap();
    assert_eq!(reversed.value.payment_status, Some(PaymentStatus::Unpaid));

    let group = out.group.expect("cascade ran").unwrap();
    assert_eq!(group.id, gid);
    assert_eq!(group.payment_status, PaymentStatus::Unpaid);
}

#[tokio::test]
async fn type_reversal_through_group_path() {
    let h = Harness::new();
    let gid = paid_group(&h, "7102").await;

    let group = h
        .service
        .reverse_group_payment(&gid, PenaltyType::Im)
        .await
        .unwrap();
    assert_eq!(group.payment_status, PaymentStatus::Unpaid);
}

#[tokio::test]
async fn reversal_on_unpaid_group_keeps_its_version() {
    let h = Harness::new();
    let view = h
        .service
        .create_group(sample_group("7103", &[PenaltyType::Fpn, PenaltyType::Im]))
        .await
        .unwrap();
    h.service
        .apply_group_payment(&view.group.id, pay(PenaltyType::Fpn))
        .await
        .unwrap();

    let out = h
        .service
        .reverse_payments(&["7103_FPN".to_string()])
        .await;
    let group = out.group.expect("cascade ran").unwrap();
    assert_eq!(group.payment_status, PaymentStatus::Unpaid);
    assert_eq!(group.hash, view.group.hash);
}
