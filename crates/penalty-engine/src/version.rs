//! Version tokens for records and groups.
//!
//! A record's token covers its payload with the cached payment fields
//! removed, so the oracle-driven decoration a client sees never changes the
//! token it must present back.

use penalty_hash::{integrity_hash, verify, VerifyResult};
use penalty_schemas::{PenaltyGroup, PenaltyRecord, PenaltyValue};

use crate::{EngineError, EngineResult};

pub fn content_hash(id: &str, value: &PenaltyValue, enabled: bool) -> EngineResult<String> {
    let mut content = value.clone();
    content.take_payment();
    let json = serde_json::to_value(&content)
        .map_err(|e| EngineError::Validation(format!("payload for {id} is not serializable: {e}")))?;
    Ok(integrity_hash(id, &json, enabled))
}

pub fn group_hash(group: &PenaltyGroup) -> String {
    integrity_hash(&group.id, &group.hash_payload(), group.enabled)
}

/// Log, without failing, a record whose stored token no longer matches its
/// content: the trace a partial cascade leaves behind.
pub fn log_drift(record: &PenaltyRecord) {
    let mut content = record.value.clone();
    content.take_payment();
    match verify(&record.id, &content, record.enabled, &record.hash) {
        Ok(VerifyResult::Valid) => {}
        Ok(VerifyResult::Mismatch { stored, recomputed }) => tracing::warn!(
            id = %record.id,
            enabled = record.enabled,
            stored = %stored,
            recomputed = %recomputed,
            "record hash drift"
        ),
        Err(e) => tracing::warn!(id = %record.id, error = %e, "record hash verify failed"),
    }
}

/// Index form of a vehicle registration: uppercase, no whitespace.
pub fn normalise_registration(raw: &str) -> Option<String> {
    let n: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();
    (!n.is_empty()).then_some(n)
}
