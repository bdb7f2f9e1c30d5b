use penalty_schemas::Origin;

use crate::ItemVersion;

/// Precondition on the current version of one key.
///
/// Every test other than `Always` and `NotExists` is false for an absent item.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Always,
    Exists,
    NotExists,
    HashEquals(String),
    EnabledIs(bool),
    OriginIs(Origin),
    /// Stored `Offset` strictly below the bound.
    OffsetBelow(f64),
    All(Vec<Condition>),
    Any(Vec<Condition>),
}

impl Condition {
    pub fn evaluate(&self, current: Option<&ItemVersion>) -> bool {
        match self {
            Condition::Always => true,
            Condition::Exists => current.is_some(),
            Condition::NotExists => current.is_none(),
            Condition::HashEquals(h) => current.is_some_and(|v| &v.hash == h),
            Condition::EnabledIs(e) => current.is_some_and(|v| v.enabled == *e),
            Condition::OriginIs(o) => current.is_some_and(|v| v.origin == *o),
            Condition::OffsetBelow(b) => current.is_some_and(|v| v.offset < *b),
            Condition::All(cs) => cs.iter().all(|c| c.evaluate(current)),
            Condition::Any(cs) => cs.iter().any(|c| c.evaluate(current)),
        }
    }
}
