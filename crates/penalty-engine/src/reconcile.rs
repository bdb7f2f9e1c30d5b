//! Merge authoritative payment state from the oracle into records.
//!
//! Read paths decorate the response only: cached payment fields on the
//! returned records are overwritten, nothing is written back. Write paths
//! (payment apply / reverse) persist cached fields themselves and use
//! [`PaymentReconciler::status_of`] only as a guard.

use std::collections::HashMap;
use std::sync::Arc;

use penalty_schemas::{CachedPayment, PaymentStatus, PenaltyRecord};
use penalty_upstream::PaymentOracle;

use crate::EngineResult;

/// Oracle answer for a set of IDs. IDs the oracle did not return are unpaid.
#[derive(Debug, Clone, Default)]
pub struct PaymentLedger {
    by_id: HashMap<String, CachedPayment>,
}

impl PaymentLedger {
    pub fn payment_for(&self, id: &str) -> CachedPayment {
        self.by_id
            .get(id)
            .cloned()
            .unwrap_or_else(CachedPayment::unpaid)
    }

    pub fn status_of(&self, id: &str) -> PaymentStatus {
        self.by_id
            .get(id)
            .and_then(|c| c.status)
            .unwrap_or(PaymentStatus::Unpaid)
    }
}

#[derive(Clone)]
pub struct PaymentReconciler {
    oracle: Arc<dyn PaymentOracle>,
}

impl PaymentReconciler {
    pub fn new(oracle: Arc<dyn PaymentOracle>) -> Self {
        Self { oracle }
    }

    pub async fn ledger(&self, ids: &[String]) -> EngineResult<PaymentLedger> {
        let payments = self.oracle.fetch_payments(ids).await?;
        let by_id = payments
            .into_iter()
            .map(|p| (p.id.clone(), p.cached()))
            .collect();
        Ok(PaymentLedger { by_id })
    }

    pub async fn status_of(&self, id: &str) -> EngineResult<PaymentStatus> {
        let ledger = self.ledger(&[id.to_string()]).await?;
        Ok(ledger.status_of(id))
    }

    /// Overwrite cached payment fields on `records` from the oracle.
    pub async fn decorate(&self, records: &mut [PenaltyRecord]) -> EngineResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let ledger = self.ledger(&ids).await?;
        for r in records.iter_mut() {
            r.value.set_payment(ledger.payment_for(&r.id));
        }
        Ok(())
    }

    pub async fn decorate_one(&self, record: &mut PenaltyRecord) -> EngineResult<()> {
        self.decorate(std::slice::from_mut(record)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penalty_schemas::{OraclePayment, OraclePaymentDetail, Origin, PenaltyValue};
    use penalty_upstream::UpstreamResult;

    struct OneOracle;

    #[async_trait::async_trait]
    impl PaymentOracle for OneOracle {
        async fn fetch_payments(&self, ids: &[String]) -> UpstreamResult<Vec<OraclePayment>> {
            Ok(ids
                .iter()
                .filter(|id| id.as_str() == "paid_FPN")
                .map(|id| OraclePayment {
                    id: id.clone(),
                    penalty_status: PaymentStatus::Paid,
                    payment_detail: OraclePaymentDetail {
                        auth_code: Some("AUTH".into()),
                        ..OraclePaymentDetail::default()
                    },
                })
                .collect())
        }
    }

    fn rec(id: &str, cached: PaymentStatus) -> PenaltyRecord {
        PenaltyRecord {
            id: id.into(),
            value: PenaltyValue {
                payment_status: Some(cached),
                payment_ref: Some("stale".into()),
                ..PenaltyValue::default()
            },
            enabled: true,
            hash: "h".into(),
            offset: 1.0,
            origin: Origin::App,
            vehicle_registration: None,
        }
    }

    #[tokio::test]
    async fn absent_from_oracle_means_unpaid() {
        let rc = PaymentReconciler::new(Arc::new(OneOracle));
        let mut recs = vec![
            rec("paid_FPN", PaymentStatus::Unpaid),
            rec("other_IM", PaymentStatus::Paid),
        ];
        rc.decorate(&mut recs).await.unwrap();

        assert_eq!(recs[0].value.payment_status, Some(PaymentStatus::Paid));
        assert_eq!(recs[0].value.payment_auth_code.as_deref(), Some("AUTH"));
        assert_eq!(recs[0].value.payment_ref, None);
        assert_eq!(recs[1].value.payment_status, Some(PaymentStatus::Unpaid));
        assert_eq!(recs[1].value.payment_ref, None);
    }
}
