//! In-process fixtures for scenario tests: fake upstreams, a store with
//! injectable write failures, and a harness wiring them into a
//! [`PenaltyService`]. Nothing here touches a network or a database.

use std::sync::Arc;

use penalty_engine::{BasicValidator, NotifyTopics, PageLimits, PenaltyService, ServiceDeps};
use penalty_schemas::{
    DocumentInput, GroupInput, Origin, PenaltyGroup, PenaltyRecord, PenaltyType, PenaltyValue,
    VehicleDetails,
};
use penalty_store::{BestEffortBatchWriter, MemoryStore};

mod fakes;
mod flaky;

pub use fakes::{FakeDecoder, FakeOracle, RecordingSink};
pub use flaky::FlakyStore;

pub const DOCUMENT_TOPIC: &str = "test-payments";
pub const GROUP_TOPIC: &str = "test-group-payments";

/// A service over memory stores and fakes, with handles to all of them.
pub struct Harness {
    pub service: Arc<PenaltyService>,
    pub documents: Arc<FlakyStore<PenaltyRecord>>,
    pub groups: Arc<MemoryStore<PenaltyGroup>>,
    pub oracle: Arc<FakeOracle>,
    pub decoder: Arc<FakeDecoder>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new() -> Self {
        let documents = Arc::new(FlakyStore::new(Arc::new(MemoryStore::new())));
        let groups = Arc::new(MemoryStore::new());
        let oracle = Arc::new(FakeOracle::new());
        let decoder = Arc::new(FakeDecoder::new());
        let sink = Arc::new(RecordingSink::new());

        let batch_writer = Arc::new(BestEffortBatchWriter::new(
            groups.clone(),
            documents.clone(),
        ));
        let service = PenaltyService::new(ServiceDeps {
            documents: documents.clone(),
            groups: groups.clone(),
            batch_writer,
            oracle: oracle.clone(),
            decoder: decoder.clone(),
            sink: sink.clone(),
            topics: NotifyTopics {
                document: DOCUMENT_TOPIC.into(),
                group: GROUP_TOPIC.into(),
            },
            validator: Arc::new(BasicValidator),
            limits: PageLimits::default(),
        });

        Self {
            service: Arc::new(service),
            documents,
            groups,
            oracle,
            decoder,
            sink,
        }
    }

    /// Writes that reached the document store.
    pub fn document_writes(&self) -> u64 {
        self.documents.inner().write_count()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn sample_value(reference: &str, penalty_type: PenaltyType, amount: i64) -> PenaltyValue {
    let mut value = PenaltyValue {
        reference_no: Some(reference.to_string()),
        penalty_type: Some(penalty_type),
        vehicle_details: Some(VehicleDetails {
            reg_no: "AB12 CDE".into(),
            ..VehicleDetails::default()
        }),
        penalty_amount: Some(amount),
        date_time: Some(1_532_945_465),
        site_code: Some(-72),
        ..PenaltyValue::default()
    };
    value
        .extra
        .insert("officerName".into(), serde_json::json!("Officer Dibble"));
    value
}

/// App-origin create body for `<reference>_<type>`.
pub fn sample_document(reference: &str, penalty_type: PenaltyType) -> DocumentInput {
    DocumentInput {
        id: penalty_type.document_id(reference),
        value: sample_value(reference, penalty_type, 150),
        enabled: None,
        hash: None,
        origin: Some(Origin::App),
    }
}

/// Update body presenting `hash`, built from a record as returned.
pub fn edit_of(record: &PenaltyRecord, origin: Origin, hash: Option<&str>) -> DocumentInput {
    DocumentInput {
        id: record.id.clone(),
        value: record.value.clone(),
        enabled: Some(record.enabled),
        hash: hash.map(str::to_string),
        origin: Some(origin),
    }
}

/// A group at site -72 holding one document per listed type.
pub fn sample_group(reference: &str, types: &[PenaltyType]) -> GroupInput {
    let members: Vec<(&str, PenaltyType)> = types.iter().map(|t| (reference, *t)).collect();
    group_of(&members)
}

/// A group at site -72 over explicit `(reference, type)` members, so one
/// type can appear more than once.
pub fn group_of(members: &[(&str, PenaltyType)]) -> GroupInput {
    GroupInput {
        timestamp: 1_532_945_465.234,
        site_code: -72,
        location: Some("Abingdon services".into()),
        vehicle_registration: Some("AB12 CDE".into()),
        origin: Some(Origin::App),
        penalties: members
            .iter()
            .map(|(reference, t)| sample_document(reference, *t))
            .collect(),
    }
}
