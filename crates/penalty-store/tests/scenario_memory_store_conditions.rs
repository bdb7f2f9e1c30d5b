//! Conditional writes and pagination on the in-memory store
//!
//! GREEN when:
//! - `NotExists` inserts once; a second insert of the same key is rejected.
//! - Of N concurrent hash-conditioned updates, exactly one wins.
//! - A failed condition performs no write.
//! - `OffsetAfter` pages ascend by offset, never repeat, and end with `next = None`.
//! - `IndexKeyEquals` matches only the given key; `batch_get` keeps input order.

use std::sync::Arc;

use penalty_schemas::{Origin, PenaltyGroup, PenaltyRecord, PenaltyValue, PaymentStatus};
use penalty_store::{
    BestEffortBatchWriter, Condition, GroupBatchWriter, IndexQuery, ItemStore, ItemUpdate,
    MemoryStore, StoreError,
};

fn rec(id: &str, offset: f64, reg: &str) -> PenaltyRecord {
    PenaltyRecord {
        id: id.into(),
        value: PenaltyValue::default(),
        enabled: true,
        hash: format!("h-{id}"),
        offset,
        origin: Origin::App,
        vehicle_registration: Some(reg.into()),
    }
}

#[tokio::test]
async fn insert_if_absent_rejects_second_insert() {
    let store = MemoryStore::<PenaltyRecord>::new();
    let prev = store
        .put(rec("1_FPN", 1.0, "A"), Condition::NotExists)
        .await
        .unwrap();
    assert!(prev.is_none());

    let err = store
        .put(rec("1_FPN", 2.0, "A"), Condition::NotExists)
        .await
        .unwrap_err();
    assert!(err.is_condition_failed());
    assert_eq!(store.write_count(), 1);
    assert_eq!(store.get("1_FPN").await.unwrap().unwrap().offset, 1.0);
}

#[tokio::test]
async fn only_one_racing_conditional_update_wins() {
    let store = Arc::new(MemoryStore::<PenaltyRecord>::new());
    store.seed([rec("1_FPN", 1.0, "A")]).await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let s = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            s.update(
                "1_FPN",
                ItemUpdate::new().hash(format!("h-next-{i}")).offset(2.0 + i as f64),
                Condition::HashEquals("h-1_FPN".into()),
            )
            .await
        }));
    }

    let mut wins = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => wins += 1,
            Err(StoreError::ConditionFailed { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(store.write_count(), 1);
}

#[tokio::test]
async fn update_on_absent_key() {
    let store = MemoryStore::<PenaltyRecord>::new();
    let err = store
        .update("nope", ItemUpdate::new().enabled(false), Condition::Always)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));

    let err = store
        .update("nope", ItemUpdate::new().enabled(false), Condition::Exists)
        .await
        .unwrap_err();
    assert!(err.is_condition_failed());
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn offset_pages_ascend_without_repeats() {
    let store = MemoryStore::<PenaltyRecord>::new();
    store
        .seed([
            rec("e", 5.0, "A"),
            rec("a", 1.0, "A"),
            rec("c", 3.0, "B"),
            rec("b", 3.0, "B"),
            rec("d", 4.0, "A"),
        ])
        .await;

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = store
            .query(IndexQuery::OffsetAfter(1.0), 2, cursor)
            .await
            .unwrap();
        seen.extend(page.items.iter().map(|r| r.id.clone()));
        match page.next {
            Some(c) => cursor = Some(c),
            None => break,
        }
    }
    assert_eq!(seen, vec!["b", "c", "d", "e"]);
}

#[tokio::test]
async fn index_query_and_batch_get_order() {
    let store = MemoryStore::<PenaltyRecord>::new();
    store
        .seed([rec("x", 2.0, "AB12CDE"), rec("y", 1.0, "AB12CDE"), rec("z", 3.0, "ZZ")])
        .await;

    let page = store
        .query(IndexQuery::IndexKeyEquals("AB12CDE".into()), 10, None)
        .await
        .unwrap();
    let ids: Vec<_> = page.items.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["y", "x"]);
    assert!(page.next.is_none());

    let got = store
        .batch_get(&["z".into(), "missing".into(), "x".into()])
        .await
        .unwrap();
    let ids: Vec<_> = got.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["z", "x"]);
}

#[tokio::test]
async fn best_effort_writer_stores_group_and_members() {
    let groups = Arc::new(MemoryStore::<PenaltyGroup>::new());
    let docs = Arc::new(MemoryStore::<PenaltyRecord>::new());
    let writer = BestEffortBatchWriter::new(groups.clone(), docs.clone());

    let group = PenaltyGroup {
        id: "g1".into(),
        penalty_document_ids: vec!["1_FPN".into(), "2_IM".into()],
        total_amount: 250,
        payment_status: PaymentStatus::Unpaid,
        hash: "gh".into(),
        offset: 10.0,
        enabled: true,
        origin: Origin::App,
        timestamp: 10.0,
        site_code: 3,
        location: None,
        vehicle_registration: None,
    };
    writer
        .write_group(group, vec![rec("1_FPN", 10.0, "A"), rec("2_IM", 10.0, "A")])
        .await
        .unwrap();

    assert_eq!(groups.len().await, 1);
    assert_eq!(docs.len().await, 2);
}
