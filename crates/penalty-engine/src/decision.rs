//! Conflict resolution for the generic update path.
//!
//! The decision is computed from a fresh read, before any write, and then
//! turned into the store precondition that makes the write safe against a
//! concurrent change between the read and the write.

use penalty_schemas::{Origin, NO_PRIOR_HASH};
use penalty_store::{Condition, ItemVersion};

/// The hash a caller presented with an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentedHash {
    /// Absent, empty, or the "New" sentinel.
    Unknown,
    Known(String),
}

impl PresentedHash {
    pub fn from_input(hash: Option<&str>) -> Self {
        match hash.map(str::trim) {
            None | Some("") | Some(NO_PRIOR_HASH) => PresentedHash::Unknown,
            Some(h) => PresentedHash::Known(h.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteDecision {
    /// No stored record: plain insert.
    Insert,
    /// Portal writes win over whatever is stored.
    PortalOverride { stored_enabled: bool },
    /// App presented the current hash.
    AppMatch { presented: String, stored_enabled: bool },
    /// App has never seen a version and the stored record is a tombstone.
    AppRecoverTombstone,
    Reject { reason: &'static str },
}

pub fn resolve_update(
    origin: Origin,
    presented: &PresentedHash,
    stored: Option<&ItemVersion>,
) -> WriteDecision {
    let Some(stored) = stored else {
        return WriteDecision::Insert;
    };

    match (origin, presented) {
        (Origin::Portal, _) => WriteDecision::PortalOverride {
            stored_enabled: stored.enabled,
        },
        (Origin::App, PresentedHash::Known(h)) if *h == stored.hash => WriteDecision::AppMatch {
            presented: h.clone(),
            stored_enabled: stored.enabled,
        },
        (Origin::App, PresentedHash::Known(_)) => WriteDecision::Reject {
            reason: "presented hash does not match the stored version",
        },
        (Origin::App, PresentedHash::Unknown) if !stored.enabled => {
            WriteDecision::AppRecoverTombstone
        }
        (Origin::App, PresentedHash::Unknown) => WriteDecision::Reject {
            reason: "record exists; a blind app write cannot replace it",
        },
    }
}

impl WriteDecision {
    /// Store precondition for an accepted decision; `None` for `Reject`.
    pub fn precondition(&self) -> Option<Condition> {
        match self {
            WriteDecision::Insert => Some(Condition::NotExists),
            WriteDecision::PortalOverride { stored_enabled } => Some(Condition::All(vec![
                Condition::Exists,
                Condition::EnabledIs(*stored_enabled),
            ])),
            WriteDecision::AppMatch { presented, .. } => {
                Some(Condition::HashEquals(presented.clone()))
            }
            WriteDecision::AppRecoverTombstone => Some(Condition::All(vec![
                Condition::Exists,
                Condition::EnabledIs(false),
            ])),
            WriteDecision::Reject { .. } => None,
        }
    }

    /// Enabled flag to write. Only a fresh insert or a tombstone recovery may
    /// take the caller's flag; the other branches keep what is stored.
    pub fn enabled_flag(&self, requested: bool) -> bool {
        match self {
            WriteDecision::Insert | WriteDecision::AppRecoverTombstone => requested,
            WriteDecision::PortalOverride { stored_enabled }
            | WriteDecision::AppMatch { stored_enabled, .. } => *stored_enabled,
            WriteDecision::Reject { .. } => false,
        }
    }
}
