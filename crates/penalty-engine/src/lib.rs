//! penalty-engine
//!
//! Consistency rules for penalty documents and groups: optimistic version
//! checks, origin authority, tombstones, payment reconciliation and the
//! group cascades. Storage and upstream services arrive as trait objects.

pub mod batch;
pub mod decision;
mod error;
pub mod groups;
pub mod notify;
pub mod offset;
pub mod reconcile;
pub mod records;
pub mod service;
pub mod validation;
pub mod version;

pub use error::{EngineError, EngineResult};
pub use groups::{generate_group_id, GroupDeletion};
pub use notify::NotifyTopics;
pub use service::{BatchReversal, PageLimits, PenaltyService, ServiceDeps, TokenLookup};
pub use validation::{BasicValidator, Validator};
