use std::sync::Arc;

use penalty_schemas::{PenaltyGroup, PenaltyRecord};

use crate::{ItemStore, StoreError, StoreResult};

/// Writes a new group projection together with its stamped members.
///
/// Implementations decide the atomicity. The default one below is best-effort
/// and reports only an aggregate failure.
#[async_trait::async_trait]
pub trait GroupBatchWriter: Send + Sync {
    async fn write_group(&self, group: PenaltyGroup, members: Vec<PenaltyRecord>) -> StoreResult<()>;
}

pub struct BestEffortBatchWriter {
    groups: Arc<dyn ItemStore<PenaltyGroup>>,
    documents: Arc<dyn ItemStore<PenaltyRecord>>,
}

impl BestEffortBatchWriter {
    pub fn new(
        groups: Arc<dyn ItemStore<PenaltyGroup>>,
        documents: Arc<dyn ItemStore<PenaltyRecord>>,
    ) -> Self {
        Self { groups, documents }
    }
}

#[async_trait::async_trait]
impl GroupBatchWriter for BestEffortBatchWriter {
    async fn write_group(&self, group: PenaltyGroup, members: Vec<PenaltyRecord>) -> StoreResult<()> {
        let attempted = members.len() + 1;
        let (g, m) = futures_util::future::join(
            self.groups.batch_write(vec![group]),
            self.documents.batch_write(members),
        )
        .await;

        let failed = failed_count(&g, 1) + failed_count(&m, attempted - 1);
        if failed > 0 {
            return Err(StoreError::BatchIncomplete { attempted, failed });
        }
        Ok(())
    }
}

fn failed_count(res: &StoreResult<()>, attempted: usize) -> usize {
    match res {
        Ok(()) => 0,
        Err(StoreError::BatchIncomplete { failed, .. }) => *failed,
        Err(_) => attempted,
    }
}
