use std::sync::Arc;

use chrono::Utc;
use penalty_schemas::{
    NotificationKind, PaymentNotification, PaymentStatus, PenaltyGroup, PenaltyRecord, PenaltyType,
};
use penalty_upstream::NotificationSink;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyTopics {
    pub document: String,
    pub group: String,
}

/// Fire-and-forget payment notifications.
///
/// Each publish runs on its own task. Failures are logged and dropped; there
/// is no outbox and no retry. The returned handle exists for tests.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    topics: NotifyTopics,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, topics: NotifyTopics) -> Self {
        Self { sink, topics }
    }

    pub fn document_payment(&self, record: &PenaltyRecord, status: PaymentStatus) -> JoinHandle<()> {
        let msg = PaymentNotification {
            message_id: PaymentNotification::message_id_for(&record.id, record.offset),
            kind: NotificationKind::Document,
            id: record.id.clone(),
            penalty_type: record.penalty_type(),
            vehicle_registration: record
                .vehicle_registration
                .clone()
                .or_else(|| record.value.registration().map(str::to_string)),
            payment_status: status,
            origin: record.origin,
            sent_at: Utc::now(),
        };
        self.dispatch(self.topics.document.clone(), msg)
    }

    pub fn group_payment(
        &self,
        group: &PenaltyGroup,
        penalty_type: PenaltyType,
        status: PaymentStatus,
    ) -> JoinHandle<()> {
        let msg = PaymentNotification {
            message_id: PaymentNotification::message_id_for(&group.id, group.offset),
            kind: NotificationKind::Group,
            id: group.id.clone(),
            penalty_type: Some(penalty_type),
            vehicle_registration: group.vehicle_registration.clone(),
            payment_status: status,
            origin: group.origin,
            sent_at: Utc::now(),
        };
        self.dispatch(self.topics.group.clone(), msg)
    }

    fn dispatch(&self, topic: String, msg: PaymentNotification) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            match sink.publish(&topic, &msg).await {
                Ok(()) => tracing::debug!(topic = %topic, id = %msg.id, "payment notification sent"),
                Err(e) => tracing::warn!(
                    topic = %topic,
                    id = %msg.id,
                    error = %e,
                    "payment notification failed; dropped"
                ),
            }
        })
    }
}
