//! Group delete with a failing member write
//!
//! GREEN when:
//! - A member write failure does not stop the other members or the group
//!   from being disabled, and the failed member is reported by ID.
//! - Repeating the delete after the fault clears finishes the job.
//! - Deleting an unknown group is not-found.

use penalty_engine::EngineError;
use penalty_schemas::PenaltyType;
use penalty_store::ItemStore;
use penalty_testkit::{sample_group, Harness};

#[tokio::test]
async fn partial_member_failure_is_reported_and_retry_completes() {
    let h = Harness::new();
    let view = h
        .service
        .create_group(sample_group(
            "8001",
            &[PenaltyType::Fpn, PenaltyType::Im, PenaltyType::Cdn],
        ))
        .await
        .unwrap();
    let gid = view.group.id.clone();

    h.documents.fail_writes_to("8001_IM");
    let first = h.service.delete_group(&gid).await.unwrap();
    assert!(!first.is_complete());
    assert!(!first.group.enabled);
    assert_eq!(first.disabled, ["8001_FPN", "8001_CDN"]);
    assert_eq!(first.failed.len(), 1);
    assert_eq!(first.failed[0].0, "8001_IM");

    let im = h.documents.get("8001_IM").await.unwrap().unwrap();
    assert!(im.enabled);
    let fpn = h.documents.get("8001_FPN").await.unwrap().unwrap();
    assert!(!fpn.enabled);

    h.documents.heal();
    let second = h.service.delete_group(&gid).await.unwrap();
    assert!(second.is_complete());
    assert_eq!(second.disabled.len(), 3);
    let im = h.documents.get("8001_IM").await.unwrap().unwrap();
    assert!(!im.enabled);
}

#[tokio::test]
async fn unknown_group_is_not_found() {
    let h = Harness::new();
    let err = h.service.delete_group("zzz").await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}
