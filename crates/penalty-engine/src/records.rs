//! Per-record lifecycle: create, conflict-aware update, soft delete, payment
//! apply / reverse, and the decorate-only read paths.

use std::sync::Arc;

use penalty_schemas::{
    CachedPayment, DocumentInput, Origin, PaymentInfo, PaymentStatus, PenaltyRecord, PenaltyType,
    PenaltyValue, VehicleDetails,
};
use penalty_store::{
    Condition, Cursor, IndexQuery, ItemStore, ItemUpdate, Page, StoreError, StoreItem,
};
use serde_json::json;
use tracing::{info, warn};

use crate::batch::fan_out;
use crate::decision::{resolve_update, PresentedHash, WriteDecision};
use crate::notify::Notifier;
use crate::offset::OffsetClock;
use crate::reconcile::PaymentReconciler;
use crate::validation::Validator;
use crate::version::{content_hash, log_drift, normalise_registration};
use crate::{EngineError, EngineResult};

pub struct RecordEngine {
    docs: Arc<dyn ItemStore<PenaltyRecord>>,
    reconciler: PaymentReconciler,
    notifier: Notifier,
    clock: Arc<OffsetClock>,
    validator: Arc<dyn Validator>,
}

fn index_key(value: &PenaltyValue) -> Option<String> {
    value.registration().and_then(normalise_registration)
}

impl RecordEngine {
    pub fn new(
        docs: Arc<dyn ItemStore<PenaltyRecord>>,
        reconciler: PaymentReconciler,
        notifier: Notifier,
        clock: Arc<OffsetClock>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        Self {
            docs,
            reconciler,
            notifier,
            clock,
            validator,
        }
    }

    fn validate(&self, input: &DocumentInput) -> EngineResult<()> {
        self.validator.document(input).map_err(EngineError::Validation)
    }

    /// Decorate a freshly written record. The write stands even when the
    /// oracle fails; the failure still surfaces to the caller.
    async fn decorate_after_write(&self, mut record: PenaltyRecord) -> EngineResult<PenaltyRecord> {
        if let Err(e) = self.reconciler.decorate_one(&mut record).await {
            warn!(id = %record.id, error = %e, "payment decoration after write failed");
            return Err(e);
        }
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    pub async fn create(&self, input: DocumentInput) -> EngineResult<PenaltyRecord> {
        self.validate(&input)?;

        let DocumentInput {
            id,
            mut value,
            enabled,
            origin,
            ..
        } = input;
        value.take_payment();
        let enabled = enabled.unwrap_or(true);

        let record = PenaltyRecord {
            hash: content_hash(&id, &value, enabled)?,
            offset: self.clock.next(),
            enabled,
            origin: origin.unwrap_or_default(),
            vehicle_registration: index_key(&value),
            id,
            value,
        };

        self.docs
            .put(record.clone(), Condition::NotExists)
            .await
            .map_err(|e| match e {
                StoreError::ConditionFailed { key, .. } => {
                    EngineError::conflict(key, "record already exists")
                }
                other => other.into(),
            })?;
        info!(id = %record.id, offset = record.offset, "document created");

        self.decorate_after_write(record).await
    }

    pub async fn update(&self, input: DocumentInput) -> EngineResult<PenaltyRecord> {
        self.validate(&input)?;

        let origin = input.origin.unwrap_or_default();
        let presented = PresentedHash::from_input(input.hash.as_deref());
        let stored = self.docs.get(&input.id).await?;
        let stored_version = stored.as_ref().map(StoreItem::version);

        let decision = resolve_update(origin, &presented, stored_version.as_ref());
        let condition = match (&decision, decision.precondition()) {
            (_, Some(c)) => c,
            (WriteDecision::Reject { reason }, None) => {
                info!(id = %input.id, reason, "document update rejected");
                return Err(EngineError::conflict(&input.id, *reason));
            }
            (_, None) => return Err(EngineError::conflict(&input.id, "update rejected")),
        };

        let DocumentInput {
            id,
            mut value,
            enabled,
            ..
        } = input;
        let cached = value.take_payment();
        // Group membership is owned by the group engine; an update body that
        // omits it keeps the stored membership.
        if let Some(s) = &stored {
            if value.penalty_group_id.is_none() {
                value.in_penalty_group = s.value.in_penalty_group;
                value.penalty_group_id = s.value.penalty_group_id.clone();
            }
        }
        let enabled = decision.enabled_flag(enabled.unwrap_or(true));
        let offset = match &stored {
            Some(s) => self.clock.next_after(s.offset),
            None => self.clock.next(),
        };

        let record = PenaltyRecord {
            hash: content_hash(&id, &value, enabled)?,
            offset,
            enabled,
            origin,
            vehicle_registration: index_key(&value),
            id,
            value,
        };
        self.docs.put(record.clone(), condition).await?;
        info!(id = %record.id, decision = ?decision, offset, "document updated");

        let mut view = record;
        view.value.set_payment(cached);
        if origin == Origin::App && view.value.payment_status == Some(PaymentStatus::Paid) {
            self.notifier.document_payment(&view, PaymentStatus::Paid);
        }
        Ok(view)
    }

    /// `update` over every item; results in input order.
    pub async fn update_many(&self, inputs: Vec<DocumentInput>) -> Vec<EngineResult<PenaltyRecord>> {
        fan_out(inputs, |input| self.update(input)).await
    }

    /// Soft delete. Refused for a record the oracle reports as paid.
    pub async fn disable(&self, id: &str, input: DocumentInput) -> EngineResult<PenaltyRecord> {
        self.validate(&input)?;
        if input.id != id {
            return Err(EngineError::Validation(format!(
                "body ID {:?} does not match {id:?}",
                input.id
            )));
        }

        if self.reconciler.status_of(id).await? == PaymentStatus::Paid {
            info!(id, "delete refused: record is paid");
            return Err(EngineError::conflict(id, "cannot remove a paid record"));
        }

        let PresentedHash::Known(presented) = PresentedHash::from_input(input.hash.as_deref()) else {
            return Err(EngineError::Validation("Hash is required to delete a record".into()));
        };
        if content_hash(id, &input.value, true)? != presented {
            return Err(EngineError::conflict(id, "hash does not match the presented payload"));
        }

        let offset = self.clock.next();
        let update = ItemUpdate::new()
            .enabled(false)
            .hash(content_hash(id, &input.value, false)?)
            .offset(offset);
        let condition = Condition::All(vec![
            Condition::HashEquals(presented),
            Condition::EnabledIs(true),
            Condition::OffsetBelow(offset),
        ]);

        let record = self.docs.update(id, update, condition).await?;
        info!(id, offset, "document disabled");
        Ok(record)
    }

    /// Cascade form of `disable` used by group deletion: no oracle check,
    /// token recomputed from what is stored.
    pub(crate) async fn disable_member(&self, id: &str) -> EngineResult<PenaltyRecord> {
        let stored = self.load(id).await?;
        if !stored.enabled {
            return Ok(stored);
        }
        let offset = self.clock.next_after(stored.offset);
        let update = ItemUpdate::new()
            .enabled(false)
            .hash(content_hash(id, &stored.value, false)?)
            .offset(offset);
        let condition = Condition::All(vec![
            Condition::HashEquals(stored.hash.clone()),
            Condition::EnabledIs(true),
        ]);
        Ok(self.docs.update(id, update, condition).await?)
    }

    pub async fn apply_payment(&self, info: PaymentInfo) -> EngineResult<PenaltyRecord> {
        self.validator.payment(&info).map_err(EngineError::Validation)?;

        let Some(stored) = self.docs.get(&info.id).await? else {
            return self.store_placeholder(&info).await;
        };

        let record = self.persist_payment(&stored, info.cached()).await?;
        info!(id = %record.id, status = info.payment_status.as_str(), "payment applied");
        if stored.origin == Origin::App {
            self.notifier.document_payment(&record, info.payment_status);
        }
        Ok(record)
    }

    pub async fn reverse_payment(&self, id: &str) -> EngineResult<PenaltyRecord> {
        let stored = self.load(id).await?;
        let record = self.persist_payment(&stored, CachedPayment::unpaid()).await?;
        info!(id, "payment reversed");
        if stored.origin == Origin::App {
            self.notifier.document_payment(&record, PaymentStatus::Unpaid);
        }
        Ok(record)
    }

    /// Write new cached payment fields onto an existing record.
    pub(crate) async fn persist_payment(
        &self,
        stored: &PenaltyRecord,
        cached: CachedPayment,
    ) -> EngineResult<PenaltyRecord> {
        let mut value = stored.value.clone();
        value.set_payment(cached.clone());

        let offset = self.clock.next_after(stored.offset);
        let update = ItemUpdate::new()
            .hash(content_hash(&stored.id, &value, stored.enabled)?)
            .offset(offset)
            .set("Value.paymentStatus", json!(cached.status))
            .set("Value.paymentAuthCode", json!(cached.auth_code))
            .set("Value.paymentDate", json!(cached.payment_date))
            .set("Value.paymentRef", json!(cached.payment_ref))
            .set("Value.paymentMethod", json!(cached.payment_method));
        let condition = Condition::All(vec![
            Condition::HashEquals(stored.hash.clone()),
            Condition::OffsetBelow(offset),
        ]);
        Ok(self.docs.update(&stored.id, update, condition).await?)
    }

    /// A payment arrived before its document: keep it as a tombstone the app
    /// upload can later recover.
    async fn store_placeholder(&self, info: &PaymentInfo) -> EngineResult<PenaltyRecord> {
        let mut value = PenaltyValue {
            reference_no: info.id.rsplit_once('_').map(|(r, _)| r.to_string()),
            penalty_type: PenaltyType::from_document_id(&info.id),
            penalty_amount: info.penalty_amount,
            vehicle_details: info.vehicle_registration.clone().map(|reg_no| VehicleDetails {
                reg_no,
                ..VehicleDetails::default()
            }),
            ..PenaltyValue::default()
        };
        value.set_payment(info.cached());

        let record = PenaltyRecord {
            id: info.id.clone(),
            hash: content_hash(&info.id, &value, false)?,
            offset: self.clock.next(),
            enabled: false,
            origin: Origin::App,
            vehicle_registration: index_key(&value),
            value,
        };
        self.docs.put(record.clone(), Condition::NotExists).await?;
        info!(id = %record.id, "payment for unknown document stored as placeholder");
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub(crate) async fn load(&self, id: &str) -> EngineResult<PenaltyRecord> {
        self.docs
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub(crate) async fn load_many(&self, ids: &[String]) -> EngineResult<Vec<PenaltyRecord>> {
        let records = self.docs.batch_get(ids).await?;
        records.iter().for_each(log_drift);
        Ok(records)
    }

    pub async fn get(&self, id: &str) -> EngineResult<PenaltyRecord> {
        let mut record = self.load(id).await?;
        log_drift(&record);
        self.reconciler.decorate_one(&mut record).await?;
        Ok(record)
    }

    /// Records for `ids` in input order; unknown IDs are omitted.
    pub async fn get_many(&self, ids: &[String]) -> EngineResult<Vec<PenaltyRecord>> {
        let mut records = self.load_many(ids).await?;
        self.reconciler.decorate(&mut records).await?;
        Ok(records)
    }

    pub async fn list_since(
        &self,
        offset: f64,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> EngineResult<Page<PenaltyRecord>> {
        let mut page = self
            .docs
            .query(IndexQuery::OffsetAfter(offset), limit, cursor)
            .await?;
        self.reconciler.decorate(&mut page.items).await?;
        Ok(page)
    }

    pub async fn search_by_registration(
        &self,
        registration: &str,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> EngineResult<Page<PenaltyRecord>> {
        let Some(key) = normalise_registration(registration) else {
            return Err(EngineError::Validation("registration must not be empty".into()));
        };
        let mut page = self
            .docs
            .query(IndexQuery::IndexKeyEquals(key), limit, cursor)
            .await?;
        self.reconciler.decorate(&mut page.items).await?;
        Ok(page)
    }
}
