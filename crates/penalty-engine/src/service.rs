//! The service object the HTTP surface talks to.
//!
//! Built once at startup from explicit dependencies and shared behind an
//! `Arc`. No global state.

use std::sync::Arc;

use penalty_schemas::{
    DocumentInput, GroupInput, GroupPaymentInfo, GroupView, PaymentInfo, PenaltyGroup,
    PenaltyRecord, PenaltyType, PenaltyValue, NO_PRIOR_HASH,
};
use penalty_store::{Cursor, GroupBatchWriter, ItemStore, Page};
use penalty_upstream::{NotificationSink, PaymentOracle, TokenDecoder};
use tracing::{debug, info, warn};

use crate::batch::fan_out;
use crate::groups::{GroupDeletion, GroupEngine};
use crate::notify::{Notifier, NotifyTopics};
use crate::offset::OffsetClock;
use crate::reconcile::PaymentReconciler;
use crate::records::RecordEngine;
use crate::validation::Validator;
use crate::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1_000,
        }
    }
}

impl PageLimits {
    pub fn clamp(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}

/// Everything the service needs, supplied by the binary (or a test harness).
pub struct ServiceDeps {
    pub documents: Arc<dyn ItemStore<PenaltyRecord>>,
    pub groups: Arc<dyn ItemStore<PenaltyGroup>>,
    pub batch_writer: Arc<dyn GroupBatchWriter>,
    pub oracle: Arc<dyn PaymentOracle>,
    pub decoder: Arc<dyn TokenDecoder>,
    pub sink: Arc<dyn NotificationSink>,
    pub topics: NotifyTopics,
    pub validator: Arc<dyn Validator>,
    pub limits: PageLimits,
}

/// Result of a token lookup. `saved` is false for a view synthesized from
/// the token alone (no stored record yet).
#[derive(Debug, Clone)]
pub struct TokenLookup {
    pub record: PenaltyRecord,
    pub saved: bool,
}

/// Per-ID reversal results plus the single group cascade, if one ran.
#[derive(Debug)]
pub struct BatchReversal {
    pub results: Vec<EngineResult<PenaltyRecord>>,
    pub group: Option<EngineResult<PenaltyGroup>>,
}

pub struct PenaltyService {
    records: Arc<RecordEngine>,
    groups: GroupEngine,
    reconciler: PaymentReconciler,
    decoder: Arc<dyn TokenDecoder>,
    limits: PageLimits,
}

impl PenaltyService {
    pub fn new(deps: ServiceDeps) -> Self {
        let clock = Arc::new(OffsetClock::new());
        let reconciler = PaymentReconciler::new(deps.oracle);
        let notifier = Notifier::new(deps.sink, deps.topics);

        let records = Arc::new(RecordEngine::new(
            deps.documents,
            reconciler.clone(),
            notifier.clone(),
            Arc::clone(&clock),
            Arc::clone(&deps.validator),
        ));
        let groups = GroupEngine::new(
            deps.groups,
            Arc::clone(&records),
            deps.batch_writer,
            reconciler.clone(),
            notifier,
            clock,
            deps.validator,
        );

        Self {
            records,
            groups,
            reconciler,
            decoder: deps.decoder,
            limits: deps.limits,
        }
    }

    pub fn limits(&self) -> PageLimits {
        self.limits
    }

    // -----------------------------------------------------------------------
    // Documents
    // -----------------------------------------------------------------------

    pub async fn create_document(&self, input: DocumentInput) -> EngineResult<PenaltyRecord> {
        self.records.create(input).await
    }

    pub async fn update_document(&self, input: DocumentInput) -> EngineResult<PenaltyRecord> {
        self.records.update(input).await
    }

    pub async fn update_documents(
        &self,
        inputs: Vec<DocumentInput>,
    ) -> Vec<EngineResult<PenaltyRecord>> {
        self.records.update_many(inputs).await
    }

    pub async fn delete_document(
        &self,
        id: &str,
        input: DocumentInput,
    ) -> EngineResult<PenaltyRecord> {
        self.records.disable(id, input).await
    }

    pub async fn get_document(&self, id: &str) -> EngineResult<PenaltyRecord> {
        self.records.get(id).await
    }

    pub async fn get_documents(&self, ids: &[String]) -> EngineResult<Vec<PenaltyRecord>> {
        self.records.get_many(ids).await
    }

    pub async fn list_documents(
        &self,
        since: f64,
        cursor: Option<Cursor>,
        limit: Option<usize>,
    ) -> EngineResult<Page<PenaltyRecord>> {
        self.records
            .list_since(since, cursor, self.limits.clamp(limit))
            .await
    }

    pub async fn search_by_registration(
        &self,
        registration: &str,
        cursor: Option<Cursor>,
        limit: Option<usize>,
    ) -> EngineResult<Page<PenaltyRecord>> {
        self.records
            .search_by_registration(registration, cursor, self.limits.clamp(limit))
            .await
    }

    /// Resolve a payment token to its record, or to an unsaved view built
    /// from the token when the record does not exist yet.
    pub async fn get_by_token(&self, token: &str) -> EngineResult<TokenLookup> {
        let decoded = self.decoder.decode(token).await?;
        let penalty_type = PenaltyType::from_ordinal(decoded.document_type).ok_or_else(|| {
            EngineError::Validation(format!(
                "token carries unknown document type {}",
                decoded.document_type
            ))
        })?;
        let id = penalty_type.document_id(&decoded.reference);

        match self.records.get(&id).await {
            Ok(record) => Ok(TokenLookup {
                record,
                saved: true,
            }),
            Err(EngineError::NotFound(_)) => {
                debug!(id = %id, "token resolves to a document not stored yet");
                let mut record = PenaltyRecord {
                    id,
                    value: PenaltyValue {
                        reference_no: Some(decoded.reference),
                        penalty_type: Some(penalty_type),
                        penalty_amount: Some(decoded.payment_amount),
                        ..PenaltyValue::default()
                    },
                    enabled: true,
                    hash: NO_PRIOR_HASH.to_string(),
                    offset: 0.0,
                    origin: Default::default(),
                    vehicle_registration: None,
                };
                self.reconciler.decorate_one(&mut record).await?;
                Ok(TokenLookup {
                    record,
                    saved: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    // -----------------------------------------------------------------------
    // Payments
    // -----------------------------------------------------------------------

    pub async fn apply_payment(&self, info: PaymentInfo) -> EngineResult<PenaltyRecord> {
        self.records.apply_payment(info).await
    }

    pub async fn reverse_payment(&self, id: &str) -> EngineResult<PenaltyRecord> {
        self.records.reverse_payment(id).await
    }

    /// Reverse every ID, then cascade to one group only: the group of the
    /// first record that reversed successfully. Records in other groups do not
    /// cascade.
    pub async fn reverse_payments(&self, ids: &[String]) -> BatchReversal {
        let results = fan_out(ids, |id| self.records.reverse_payment(id)).await;

        let group_id = results
            .iter()
            .find_map(|r| r.as_ref().ok())
            .and_then(|r| r.group_id().map(str::to_string));

        let skipped = results
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .filter_map(|r| r.group_id())
            .filter(|g| Some(*g) != group_id.as_deref())
            .count();
        if skipped > 0 {
            warn!(skipped, "reversal batch spans several groups; only the first cascades");
        }

        let group = match group_id {
            Some(gid) => {
                let res = self.groups.mark_unpaid(&gid).await;
                if let Err(e) = &res {
                    warn!(group = %gid, error = %e, "group cascade after reversal failed");
                }
                Some(res)
            }
            None => None,
        };
        info!(count = ids.len(), "payment reversal batch done");
        BatchReversal { results, group }
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    pub async fn create_group(&self, input: GroupInput) -> EngineResult<GroupView> {
        self.groups.create(input).await
    }

    pub async fn get_group(&self, id: &str) -> EngineResult<GroupView> {
        self.groups.get(id).await
    }

    pub async fn list_groups(
        &self,
        since: f64,
        cursor: Option<Cursor>,
        limit: Option<usize>,
    ) -> EngineResult<Page<PenaltyGroup>> {
        self.groups
            .list_since(since, cursor, self.limits.clamp(limit))
            .await
    }

    pub async fn apply_group_payment(
        &self,
        group_id: &str,
        info: GroupPaymentInfo,
    ) -> EngineResult<PenaltyGroup> {
        self.groups.apply_payment(group_id, info).await
    }

    pub async fn reverse_group_payment(
        &self,
        group_id: &str,
        penalty_type: PenaltyType,
    ) -> EngineResult<PenaltyGroup> {
        self.groups.reverse_payment(group_id, penalty_type).await
    }

    pub async fn delete_group(&self, id: &str) -> EngineResult<GroupDeletion> {
        self.groups.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limits_clamp() {
        let l = PageLimits {
            default_limit: 50,
            max_limit: 200,
        };
        assert_eq!(l.clamp(None), 50);
        assert_eq!(l.clamp(Some(0)), 1);
        assert_eq!(l.clamp(Some(10_000)), 200);
        assert_eq!(l.clamp(Some(7)), 7);
    }
}
