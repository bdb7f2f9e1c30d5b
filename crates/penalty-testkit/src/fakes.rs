use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use penalty_schemas::{
    DecodedToken, OraclePayment, OraclePaymentDetail, PaymentNotification, PaymentStatus,
};
use penalty_upstream::{
    NotificationSink, PaymentOracle, TokenDecoder, UpstreamError, UpstreamResult,
};
use tokio::sync::Notify;

/// Payment oracle backed by a map. Used ONLY for tests.
#[derive(Default)]
pub struct FakeOracle {
    payments: Mutex<HashMap<String, OraclePayment>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_paid(&self, id: &str, payment_ref: &str) {
        let p = OraclePayment {
            id: id.to_string(),
            penalty_status: PaymentStatus::Paid,
            payment_detail: OraclePaymentDetail {
                auth_code: Some(format!("AUTH-{payment_ref}")),
                payment_date: Some(1_533_000_000),
                payment_ref: Some(payment_ref.to_string()),
                payment_method: Some("CARD".into()),
            },
        };
        lock(&self.payments).insert(id.to_string(), p);
    }

    /// Forget any payment for `id`; the oracle then reports it unpaid.
    pub fn clear(&self, id: &str) {
        lock(&self.payments).remove(id);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl PaymentOracle for FakeOracle {
    async fn fetch_payments(&self, ids: &[String]) -> UpstreamResult<Vec<OraclePayment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::Api {
                service: "payment-oracle",
                status: 503,
                message: "injected outage".into(),
            });
        }
        let payments = lock(&self.payments);
        Ok(ids.iter().filter_map(|id| payments.get(id).cloned()).collect())
    }
}

/// Token decoder with a fixed token table.
#[derive(Default)]
pub struct FakeDecoder {
    tokens: Mutex<HashMap<String, DecodedToken>>,
}

impl FakeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: &str, reference: &str, document_type: i64, payment_amount: i64) {
        lock(&self.tokens).insert(
            token.to_string(),
            DecodedToken {
                reference: reference.to_string(),
                document_type,
                payment_amount,
            },
        );
    }
}

#[async_trait::async_trait]
impl TokenDecoder for FakeDecoder {
    async fn decode(&self, token: &str) -> UpstreamResult<DecodedToken> {
        lock(&self.tokens)
            .get(token)
            .cloned()
            .ok_or(UpstreamError::BadToken)
    }
}

/// Sink that records every published notification.
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<(String, PaymentNotification)>>,
    arrived: Notify,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, PaymentNotification)> {
        lock(&self.published).clone()
    }

    /// Wait until at least `n` notifications arrived or `timeout` passed,
    /// then return what was recorded.
    pub async fn wait_for(&self, n: usize, timeout: Duration) -> Vec<(String, PaymentNotification)> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.arrived.notified();
            let seen = self.published();
            if seen.len() >= n {
                return seen;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.published();
            }
        }
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(&self, topic: &str, message: &PaymentNotification) -> UpstreamResult<()> {
        lock(&self.published).push((topic.to_string(), message.clone()));
        self.arrived.notify_waiters();
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
