//! Group lifecycle and the cascades between a group and its members.
//!
//! A group is a projection: it stores member IDs, never member payloads.
//! Every cascade is a sequence of independent single-item writes; a failure
//! part way leaves earlier writes in place (no compensation).

use std::sync::Arc;

use penalty_schemas::{
    DocumentInput, GroupInput, GroupPaymentInfo, GroupView, Origin, PaymentDetail, PaymentStatus,
    PenaltyGroup, PenaltyRecord, PenaltyType,
};
use penalty_store::{Condition, Cursor, GroupBatchWriter, IndexQuery, ItemStore, ItemUpdate, Page};
use serde_json::json;
use tracing::{info, warn};

use crate::batch::{fan_out, fan_out_or_abort, partition};
use crate::notify::Notifier;
use crate::offset::OffsetClock;
use crate::reconcile::PaymentReconciler;
use crate::records::RecordEngine;
use crate::validation::Validator;
use crate::version::{content_hash, group_hash, normalise_registration};
use crate::{EngineError, EngineResult};

// ---------------------------------------------------------------------------
// Group IDs
// ---------------------------------------------------------------------------

const TWO_POW_53: f64 = 9_007_199_254_740_992.0;
const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Derive a group ID from its creation time and site code.
///
/// The site code is written sign-magnitude (a leading `1` for negative
/// codes) and zero padded to four digits, counting the sign digit. Exact
/// powers of ten come out one digit wider; existing IDs depend on that.
/// Millisecond timestamp digits and the site digits are concatenated, read
/// as a double, and written in lowercase base 36.
pub fn generate_group_id(timestamp: f64, site_code: i32) -> EngineResult<String> {
    if !(timestamp.is_finite() && timestamp > 0.0) {
        return Err(EngineError::Validation(format!(
            "group timestamp must be positive, got {timestamp}"
        )));
    }
    let site = site_digits(site_code)?;
    let millis = millis_digits(timestamp);

    let digits = format!("{millis}{site}");
    let n: f64 = digits
        .parse()
        .map_err(|_| EngineError::Validation(format!("group id digits {digits:?} not numeric")))?;
    Ok(to_base36(n))
}

/// Timestamp rounded to three decimals with the point dropped. Rounds on
/// the exact binary value with ties going up, as `Number.toFixed` does;
/// `format!("{:.3}")` would send exact ties to the even digit instead.
fn millis_digits(timestamp: f64) -> String {
    // Wide enough to print any positive timestamp's binary value exactly.
    let exact = format!("{timestamp:.60}");
    let (int, frac) = exact.split_once('.').unwrap_or((exact.as_str(), ""));
    let frac = frac.as_bytes();

    let mut digits: Vec<u8> = int.bytes().collect();
    digits.extend((0..3).map(|i| frac.get(i).copied().unwrap_or(b'0')));
    if frac.get(3).is_some_and(|&d| d >= b'5') {
        increment(&mut digits);
    }

    let start = digits
        .iter()
        .position(|&d| d != b'0')
        .unwrap_or(digits.len().saturating_sub(1));
    digits[start..].iter().map(|&d| d as char).collect()
}

fn increment(digits: &mut Vec<u8>) {
    for d in digits.iter_mut().rev() {
        if *d == b'9' {
            *d = b'0';
        } else {
            *d += 1;
            return;
        }
    }
    digits.insert(0, b'1');
}

fn site_digits(site_code: i32) -> EngineResult<String> {
    if site_code == 0 {
        return Err(EngineError::Validation("site code must not be zero".into()));
    }
    let negative = site_code < 0;
    let magnitude = site_code.unsigned_abs();
    let width = (f64::from(magnitude)).log10().ceil() as i64;
    let zeros = 4 - width - i64::from(negative);
    if zeros < 0 {
        return Err(EngineError::Validation(format!(
            "site code {site_code} is too wide for a group id"
        )));
    }
    Ok(format!(
        "{}{}{magnitude}",
        if negative { "1" } else { "" },
        "0".repeat(zeros as usize)
    ))
}

/// Integer part of `value` in base 36, digit for digit as a JavaScript
/// engine's `Number.prototype.toString(36)` writes it: digits below the
/// 53-bit precision floor are written as `0`.
fn to_base36(value: f64) -> String {
    let mut integer = value.floor();
    let mut out: Vec<u8> = Vec::new();
    while integer / 36.0 >= TWO_POW_53 {
        integer /= 36.0;
        out.push(b'0');
    }
    loop {
        let rem = integer % 36.0;
        out.push(BASE36[rem as usize]);
        integer = (integer - rem) / 36.0;
        if integer <= 0.0 {
            break;
        }
    }
    out.iter().rev().map(|&b| b as char).collect()
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Outcome of a group delete. Member failures do not undo anything.
#[derive(Debug, Clone)]
pub struct GroupDeletion {
    pub group: PenaltyGroup,
    pub disabled: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl GroupDeletion {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct GroupEngine {
    groups: Arc<dyn ItemStore<PenaltyGroup>>,
    records: Arc<RecordEngine>,
    writer: Arc<dyn GroupBatchWriter>,
    reconciler: PaymentReconciler,
    notifier: Notifier,
    clock: Arc<OffsetClock>,
    validator: Arc<dyn Validator>,
}

impl GroupEngine {
    pub fn new(
        groups: Arc<dyn ItemStore<PenaltyGroup>>,
        records: Arc<RecordEngine>,
        writer: Arc<dyn GroupBatchWriter>,
        reconciler: PaymentReconciler,
        notifier: Notifier,
        clock: Arc<OffsetClock>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        Self {
            groups,
            records,
            writer,
            reconciler,
            notifier,
            clock,
            validator,
        }
    }

    async fn load(&self, id: &str) -> EngineResult<PenaltyGroup> {
        self.groups
            .get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(id.to_string()))
    }

    pub async fn create(&self, input: GroupInput) -> EngineResult<GroupView> {
        self.validator.group(&input).map_err(EngineError::Validation)?;

        let id = generate_group_id(input.timestamp, input.site_code)?;
        let offset = self.clock.next();

        let mut members = Vec::with_capacity(input.penalties.len());
        for doc in input.penalties {
            let DocumentInput {
                id: doc_id,
                mut value,
                enabled,
                origin,
                ..
            } = doc;
            value.take_payment();
            value.in_penalty_group = Some(true);
            value.penalty_group_id = Some(id.clone());
            let enabled = enabled.unwrap_or(true);

            members.push(PenaltyRecord {
                hash: content_hash(&doc_id, &value, enabled)?,
                offset,
                enabled,
                origin: origin.unwrap_or_default(),
                vehicle_registration: value.registration().and_then(normalise_registration),
                id: doc_id,
                value,
            });
        }

        let vehicle_registration = input
            .vehicle_registration
            .as_deref()
            .and_then(normalise_registration)
            .or_else(|| members.iter().find_map(|m| m.vehicle_registration.clone()));

        let mut group = PenaltyGroup {
            id,
            penalty_document_ids: members.iter().map(|m| m.id.clone()).collect(),
            total_amount: members.iter().filter_map(|m| m.value.penalty_amount).sum(),
            payment_status: PaymentStatus::Unpaid,
            hash: String::new(),
            offset,
            enabled: true,
            origin: input.origin.unwrap_or_default(),
            timestamp: input.timestamp,
            site_code: input.site_code,
            location: input.location,
            vehicle_registration,
        };
        group.hash = group_hash(&group);

        self.writer.write_group(group.clone(), members.clone()).await?;
        info!(
            id = %group.id,
            members = group.penalty_document_ids.len(),
            total = group.total_amount,
            "group created"
        );

        let mut penalties = members;
        if let Err(e) = self.reconciler.decorate(&mut penalties).await {
            warn!(id = %group.id, error = %e, "payment decoration after group write failed");
            return Err(e);
        }
        Ok(GroupView { group, penalties })
    }

    /// The group with its members decorated from the oracle. The returned
    /// `PaymentStatus` is derived from the decorated members.
    pub async fn get(&self, id: &str) -> EngineResult<GroupView> {
        let mut group = self.load(id).await?;
        let mut penalties = self.records.load_many(&group.penalty_document_ids).await?;
        self.reconciler.decorate(&mut penalties).await?;

        let all_paid = !penalties.is_empty()
            && penalties
                .iter()
                .all(|p| p.value.payment_status == Some(PaymentStatus::Paid));
        group.payment_status = if all_paid {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Unpaid
        };
        Ok(GroupView { group, penalties })
    }

    pub async fn list_since(
        &self,
        offset: f64,
        cursor: Option<Cursor>,
        limit: usize,
    ) -> EngineResult<Page<PenaltyGroup>> {
        Ok(self
            .groups
            .query(IndexQuery::OffsetAfter(offset), limit, cursor)
            .await?)
    }

    /// Pay (or unpay) every member of one type, then promote the group when
    /// every other member already carries the new status.
    pub async fn apply_payment(
        &self,
        group_id: &str,
        info: GroupPaymentInfo,
    ) -> EngineResult<PenaltyGroup> {
        self.validator
            .group_payment(&info)
            .map_err(EngineError::Validation)?;

        let group = self.load(group_id).await?;
        let members = self.records.load_many(&group.penalty_document_ids).await?;
        let (targets, others): (Vec<_>, Vec<_>) = members
            .into_iter()
            .partition(|m| m.penalty_type() == Some(info.penalty_type));
        if targets.is_empty() {
            return Err(EngineError::Validation(format!(
                "group {group_id} has no {} penalties",
                info.penalty_type.as_str()
            )));
        }

        let cached = info.cached();
        fan_out_or_abort(&targets, |m| self.records.persist_payment(m, cached.clone())).await?;

        let promote = info.payment_status == PaymentStatus::Paid
            && others
                .iter()
                .all(|m| m.value.payment_status_or_unpaid() == PaymentStatus::Paid);
        let status = if promote {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Unpaid
        };

        let group = if status != group.payment_status {
            self.write_status(&group, status).await?
        } else {
            group
        };
        info!(
            id = %group.id,
            penalty_type = info.penalty_type.as_str(),
            members = targets.len(),
            group_status = group.payment_status.as_str(),
            "group payment applied"
        );

        if group.origin == Origin::App {
            self.notifier
                .group_payment(&group, info.penalty_type, info.payment_status);
        }
        Ok(group)
    }

    pub async fn reverse_payment(
        &self,
        group_id: &str,
        penalty_type: PenaltyType,
    ) -> EngineResult<PenaltyGroup> {
        self.apply_payment(
            group_id,
            GroupPaymentInfo {
                penalty_type,
                payment_status: PaymentStatus::Unpaid,
                payment_detail: PaymentDetail::default(),
            },
        )
        .await
    }

    /// Force the group `UNPAID` after one of its members was reversed.
    pub async fn mark_unpaid(&self, group_id: &str) -> EngineResult<PenaltyGroup> {
        let group = self.load(group_id).await?;
        if group.payment_status == PaymentStatus::Unpaid {
            return Ok(group);
        }
        let group = self.write_status(&group, PaymentStatus::Unpaid).await?;
        info!(id = %group.id, "group reverted to unpaid");
        Ok(group)
    }

    async fn write_status(
        &self,
        group: &PenaltyGroup,
        status: PaymentStatus,
    ) -> EngineResult<PenaltyGroup> {
        let mut next = group.clone();
        next.payment_status = status;
        next.offset = self.clock.next_after(group.offset);
        next.hash = group_hash(&next);

        let update = ItemUpdate::new()
            .hash(next.hash.clone())
            .offset(next.offset)
            .set("PaymentStatus", json!(status));
        let condition = Condition::All(vec![
            Condition::HashEquals(group.hash.clone()),
            Condition::OffsetBelow(next.offset),
        ]);
        Ok(self.groups.update(&group.id, update, condition).await?)
    }

    /// Soft-disable the group, then every member. Safe to repeat: a disabled
    /// group or member is left as it is.
    pub async fn delete(&self, id: &str) -> EngineResult<GroupDeletion> {
        let stored = self.load(id).await?;

        let group = if stored.enabled {
            let mut next = stored.clone();
            next.enabled = false;
            next.offset = self.clock.next_after(stored.offset);
            next.hash = group_hash(&next);

            let update = ItemUpdate::new()
                .enabled(false)
                .hash(next.hash.clone())
                .offset(next.offset);
            let condition = Condition::All(vec![
                Condition::HashEquals(stored.hash.clone()),
                Condition::EnabledIs(true),
            ]);
            self.groups.update(id, update, condition).await?
        } else {
            stored
        };

        let ids = group.penalty_document_ids.clone();
        let results = fan_out(&ids, |m| self.records.disable_member(m)).await;
        let split = partition(&ids, results);

        let deletion = GroupDeletion {
            disabled: split.ok.into_iter().map(|r| r.id).collect(),
            failed: split
                .failed
                .into_iter()
                .map(|(id, e)| (id, e.to_string()))
                .collect(),
            group,
        };
        if deletion.is_complete() {
            info!(id, members = deletion.disabled.len(), "group deleted");
        } else {
            warn!(
                id,
                disabled = deletion.disabled.len(),
                failed = deletion.failed.len(),
                "group deleted; some members were not disabled"
            );
        }
        Ok(deletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_id_matches_reference_values() {
        assert_eq!(
            generate_group_id(1532945465.234, -72).unwrap(),
            "46xu68x7p00"
        );
        assert_eq!(generate_group_id(1532945465.234, 3).unwrap(), "46xu68x7o6c");
        assert_eq!(generate_group_id(1.5, 7).unwrap(), "8xi2v");
    }

    #[test]
    fn group_id_rounds_exact_ties_up() {
        // .0625 is exact in binary: a true tie at the third decimal.
        assert_eq!(
            generate_group_id(1536743164.0625, -37).unwrap(),
            "47basmvi67w"
        );
        assert_eq!(
            generate_group_id(1568774414.0625, -580).unwrap(),
            "4agua5zs4rg"
        );
    }

    #[test]
    fn millis_digits_rounding() {
        assert_eq!(millis_digits(1536743164.0625), "1536743164063");
        assert_eq!(millis_digits(1532945465.234), "1532945465234");
        assert_eq!(millis_digits(1.5), "1500");
        assert_eq!(millis_digits(9.9375), "9938");
        assert_eq!(millis_digits(9.9996), "10000");
        assert_eq!(millis_digits(0.0004), "0");
    }

    #[test]
    fn group_id_is_deterministic() {
        let a = generate_group_id(1532945465.234, -72).unwrap();
        let b = generate_group_id(1532945465.234, -72).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, generate_group_id(1532945465.235, -72).unwrap());
        assert_ne!(a, generate_group_id(1532945465.234, 72).unwrap());
    }

    #[test]
    fn site_digits_padding() {
        assert_eq!(site_digits(-72).unwrap(), "1072");
        assert_eq!(site_digits(3).unwrap(), "0003");
        assert_eq!(site_digits(1234).unwrap(), "1234");
        // Exact powers of ten come out one digit wider.
        assert_eq!(site_digits(100).unwrap(), "00100");
        assert_eq!(site_digits(1000).unwrap(), "01000");
        assert_eq!(generate_group_id(1532945465.234, 1000).unwrap(), "15xedqh84qhs");
    }

    #[test]
    fn invalid_site_codes() {
        assert!(site_digits(0).is_err());
        assert!(site_digits(12345).is_err());
        assert!(site_digits(-1234).is_err());
        assert!(generate_group_id(-1.0, 3).is_err());
    }

    #[test]
    fn base36_small_values() {
        assert_eq!(to_base36(0.0), "0");
        assert_eq!(to_base36(35.0), "z");
        assert_eq!(to_base36(36.0), "10");
    }
}
