//! Wire and storage shapes shared by every penalty crate.
//!
//! Persisted attribute names are PascalCase (`ID`, `Value`, `Enabled`, `Hash`,
//! `Offset`, `Origin`) and payload fields are camelCase, so items written here
//! stay readable by anything already consuming the table.
//!
//! No IO and no business rules live here; the engine owns those.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Hash value a caller sends when it has never seen a stored version.
pub const NO_PRIOR_HASH: &str = "New";

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Authority tag. Portal (back-office) writes always win over app writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Origin {
    #[default]
    App,
    Portal,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::App => "APP",
            Origin::Portal => "PORTAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "APP" => Some(Origin::App),
            "PORTAL" => Some(Origin::Portal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Paid,
    #[default]
    Unpaid,
}

impl PaymentStatus {
    pub fn opposite(self) -> Self {
        match self {
            PaymentStatus::Paid => PaymentStatus::Unpaid,
            PaymentStatus::Unpaid => PaymentStatus::Paid,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Unpaid => "UNPAID",
        }
    }
}

/// The three document kinds. The kind is also encoded as the ID suffix
/// (`<reference>_FPN`, `<reference>_IM`, `<reference>_CDN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PenaltyType {
    Fpn,
    Im,
    Cdn,
}

impl PenaltyType {
    pub const ALL: [PenaltyType; 3] = [PenaltyType::Fpn, PenaltyType::Im, PenaltyType::Cdn];

    pub fn as_str(&self) -> &'static str {
        match self {
            PenaltyType::Fpn => "FPN",
            PenaltyType::Im => "IM",
            PenaltyType::Cdn => "CDN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FPN" => Some(PenaltyType::Fpn),
            "IM" => Some(PenaltyType::Im),
            "CDN" => Some(PenaltyType::Cdn),
            _ => None,
        }
    }

    /// Ordinal table used by the token decode service.
    pub fn from_ordinal(n: i64) -> Option<Self> {
        match n {
            1 => Some(PenaltyType::Fpn),
            2 => Some(PenaltyType::Im),
            3 => Some(PenaltyType::Cdn),
            _ => None,
        }
    }

    /// Type encoded in a document ID suffix, if any.
    pub fn from_document_id(id: &str) -> Option<Self> {
        let (_, suffix) = id.rsplit_once('_')?;
        Self::parse(suffix)
    }

    pub fn document_id(&self, reference: &str) -> String {
        format!("{reference}_{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Record payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleDetails {
    pub reg_no: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Cached payment fields carried inside a record payload.
///
/// These are never authoritative: read paths overwrite them from the payment
/// oracle, and the version hash is computed with them removed on the update path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedPayment {
    pub status: Option<PaymentStatus>,
    pub auth_code: Option<String>,
    pub payment_date: Option<i64>,
    pub payment_ref: Option<String>,
    pub payment_method: Option<String>,
}

impl CachedPayment {
    pub fn unpaid() -> Self {
        Self {
            status: Some(PaymentStatus::Unpaid),
            ..Self::default()
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == Some(PaymentStatus::Paid)
    }
}

/// Mutable payload of a penalty document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_type: Option<PenaltyType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_details: Option<VehicleDetails>,
    /// Whole currency units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_amount: Option<i64>,
    /// Issue time, epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_code: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_auth_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_penalty_group: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty_group_id: Option<String>,

    /// Free-text and officer fields this service does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PenaltyValue {
    /// Remove every cached payment field, returning what was there.
    pub fn take_payment(&mut self) -> CachedPayment {
        CachedPayment {
            status: self.payment_status.take(),
            auth_code: self.payment_auth_code.take(),
            payment_date: self.payment_date.take(),
            payment_ref: self.payment_ref.take(),
            payment_method: self.payment_method.take(),
        }
    }

    pub fn set_payment(&mut self, cached: CachedPayment) {
        self.payment_status = cached.status;
        self.payment_auth_code = cached.auth_code;
        self.payment_date = cached.payment_date;
        self.payment_ref = cached.payment_ref;
        self.payment_method = cached.payment_method;
    }

    pub fn cached_payment(&self) -> CachedPayment {
        CachedPayment {
            status: self.payment_status,
            auth_code: self.payment_auth_code.clone(),
            payment_date: self.payment_date,
            payment_ref: self.payment_ref.clone(),
            payment_method: self.payment_method.clone(),
        }
    }

    /// Cached status, absent meaning unpaid.
    pub fn payment_status_or_unpaid(&self) -> PaymentStatus {
        self.payment_status.unwrap_or(PaymentStatus::Unpaid)
    }

    pub fn registration(&self) -> Option<&str> {
        self.vehicle_details
            .as_ref()
            .map(|v| v.reg_no.as_str())
            .filter(|r| !r.is_empty())
    }
}

// ---------------------------------------------------------------------------
// PenaltyRecord
// ---------------------------------------------------------------------------

/// A persisted penalty document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PenaltyRecord {
    #[serde(rename = "ID")]
    pub id: String,
    pub value: PenaltyValue,
    pub enabled: bool,
    pub hash: String,
    pub offset: f64,
    #[serde(default)]
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_registration: Option<String>,
}

impl PenaltyRecord {
    pub fn penalty_type(&self) -> Option<PenaltyType> {
        PenaltyType::from_document_id(&self.id).or(self.value.penalty_type)
    }

    pub fn group_id(&self) -> Option<&str> {
        self.value.penalty_group_id.as_deref()
    }
}

/// Inbound document body for create, update and delete.
///
/// `Hash` is optional: absent (or [`NO_PRIOR_HASH`]) means the caller has never
/// seen a stored version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DocumentInput {
    #[serde(rename = "ID")]
    pub id: String,
    pub value: PenaltyValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

// ---------------------------------------------------------------------------
// PenaltyGroup
// ---------------------------------------------------------------------------

/// Persisted group projection. Holds member IDs only, never member payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PenaltyGroup {
    #[serde(rename = "ID")]
    pub id: String,
    pub penalty_document_ids: Vec<String>,
    pub total_amount: i64,
    pub payment_status: PaymentStatus,
    pub hash: String,
    pub offset: f64,
    pub enabled: bool,
    #[serde(default)]
    pub origin: Origin,
    /// Creation time in epoch seconds (millisecond precision).
    pub timestamp: f64,
    pub site_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle_registration: Option<String>,
}

impl PenaltyGroup {
    /// The part of a group covered by its version hash.
    pub fn hash_payload(&self) -> Value {
        serde_json::json!({
            "PenaltyDocumentIds": self.penalty_document_ids,
            "TotalAmount": self.total_amount,
            "PaymentStatus": self.payment_status,
            "Timestamp": self.timestamp,
            "SiteCode": self.site_code,
            "Location": self.location,
            "VehicleRegistration": self.vehicle_registration,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GroupInput {
    pub timestamp: f64,
    pub site_code: i32,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub vehicle_registration: Option<String>,
    #[serde(default)]
    pub origin: Option<Origin>,
    pub penalties: Vec<DocumentInput>,
}

/// Read-side view of a group with its members attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupView {
    #[serde(flatten)]
    pub group: PenaltyGroup,
    #[serde(rename = "Penalties")]
    pub penalties: Vec<PenaltyRecord>,
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetail {
    #[serde(default)]
    pub auth_code: Option<String>,
    #[serde(default)]
    pub payment_date: Option<i64>,
    #[serde(default)]
    pub payment_ref: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

fn default_paid() -> PaymentStatus {
    PaymentStatus::Paid
}

/// A payment event against one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub id: String,
    #[serde(default = "default_paid")]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub payment_detail: PaymentDetail,
    #[serde(default)]
    pub penalty_amount: Option<i64>,
    #[serde(default)]
    pub vehicle_registration: Option<String>,
}

impl PaymentInfo {
    pub fn cached(&self) -> CachedPayment {
        CachedPayment {
            status: Some(self.payment_status),
            auth_code: self.payment_detail.auth_code.clone(),
            payment_date: self.payment_detail.payment_date,
            payment_ref: self.payment_detail.payment_ref.clone(),
            payment_method: self.payment_detail.payment_method.clone(),
        }
    }
}

/// A payment event against every member of one type inside a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPaymentInfo {
    pub penalty_type: PenaltyType,
    #[serde(default = "default_paid")]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub payment_detail: PaymentDetail,
}

impl GroupPaymentInfo {
    pub fn cached(&self) -> CachedPayment {
        CachedPayment {
            status: Some(self.payment_status),
            auth_code: self.payment_detail.auth_code.clone(),
            payment_date: self.payment_detail.payment_date,
            payment_ref: self.payment_detail.payment_ref.clone(),
            payment_method: self.payment_detail.payment_method.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Payment oracle wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OraclePaymentDetail {
    #[serde(default)]
    pub auth_code: Option<String>,
    #[serde(default)]
    pub payment_date: Option<i64>,
    #[serde(default)]
    pub payment_ref: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OraclePayment {
    #[serde(rename = "ID")]
    pub id: String,
    pub penalty_status: PaymentStatus,
    #[serde(default)]
    pub payment_detail: OraclePaymentDetail,
}

impl OraclePayment {
    pub fn cached(&self) -> CachedPayment {
        CachedPayment {
            status: Some(self.penalty_status),
            auth_code: self.payment_detail.auth_code.clone(),
            payment_date: self.payment_detail.payment_date,
            payment_ref: self.payment_detail.payment_ref.clone(),
            payment_method: self.payment_detail.payment_method.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentsResponse {
    #[serde(default)]
    pub payments: Vec<OraclePayment>,
}

// ---------------------------------------------------------------------------
// Token decode service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DecodedToken {
    pub reference: String,
    pub document_type: i64,
    pub payment_amount: i64,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Document,
    Group,
}

/// Payment notification published to the sink. Fire-and-forget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentNotification {
    /// Stable per (id, offset): a redelivered notification for the same
    /// mutation carries the same ID.
    pub message_id: Uuid,
    pub kind: NotificationKind,
    pub id: String,
    pub penalty_type: Option<PenaltyType>,
    pub vehicle_registration: Option<String>,
    pub payment_status: PaymentStatus,
    pub origin: Origin,
    pub sent_at: DateTime<Utc>,
}

impl PaymentNotification {
    pub fn message_id_for(id: &str, offset: f64) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{id}:{offset:.3}").as_bytes())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_round_trips_with_pascal_case_attributes() {
        let raw = json!({
            "ID": "820500000877_FPN",
            "Value": {
                "referenceNo": "820500000877",
                "penaltyType": "FPN",
                "vehicleDetails": {"regNo": "AB12CDE"},
                "penaltyAmount": 150,
                "officerName": "Officer Dibble",
                "paymentStatus": "PAID"
            },
            "Enabled": true,
            "Hash": "abc",
            "Offset": 1532945465.234,
            "Origin": "PORTAL"
        });

        let rec: PenaltyRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(rec.origin, Origin::Portal);
        assert_eq!(rec.penalty_type(), Some(PenaltyType::Fpn));
        assert_eq!(rec.value.registration(), Some("AB12CDE"));
        assert_eq!(rec.value.extra["officerName"], "Officer Dibble");
        assert_eq!(rec.value.payment_status, Some(PaymentStatus::Paid));

        let back = serde_json::to_value(&rec).unwrap();
        assert_eq!(back["Value"]["officerName"], "Officer Dibble");
        assert!(back.get("VehicleRegistration").is_none());
    }

    #[test]
    fn origin_defaults_to_app_when_absent() {
        let raw = json!({"ID": "1_IM", "Value": {}, "Enabled": true, "Hash": "h", "Offset": 1.0});
        let rec: PenaltyRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(rec.origin, Origin::App);
    }

    #[test]
    fn take_payment_strips_every_cached_field() {
        let mut v = PenaltyValue {
            payment_status: Some(PaymentStatus::Paid),
            payment_auth_code: Some("AUTH".into()),
            payment_date: Some(1),
            payment_ref: Some("REF".into()),
            payment_method: Some("CARD".into()),
            ..PenaltyValue::default()
        };
        let cached = v.take_payment();
        assert!(cached.is_paid());
        assert_eq!(v, PenaltyValue::default());

        v.set_payment(cached.clone());
        assert_eq!(v.cached_payment(), cached);
    }

    #[test]
    fn penalty_type_from_suffix_and_ordinal() {
        assert_eq!(PenaltyType::from_document_id("123_CDN"), Some(PenaltyType::Cdn));
        assert_eq!(PenaltyType::from_document_id("123"), None);
        assert_eq!(PenaltyType::from_document_id("123_XYZ"), None);
        assert_eq!(PenaltyType::from_ordinal(2), Some(PenaltyType::Im));
        assert_eq!(PenaltyType::from_ordinal(0), None);
        assert_eq!(PenaltyType::Im.document_id("99"), "99_IM");
    }

    #[test]
    fn message_id_is_stable_per_mutation() {
        let a = PaymentNotification::message_id_for("1_FPN", 10.5);
        let b = PaymentNotification::message_id_for("1_FPN", 10.5);
        let c = PaymentNotification::message_id_for("1_FPN", 10.501);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
