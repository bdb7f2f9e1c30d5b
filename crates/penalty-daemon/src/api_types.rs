//! Request and response types for the penalty-daemon HTTP endpoints.
//!
//! No business logic lives here.

use penalty_schemas::{PenaltyGroup, PenaltyRecord, PenaltyType};
use penalty_store::{Cursor, Page};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub config_hash: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// "validation" | "conflict" | "not_found" | "upstream" | "persistence"
    pub kind: String,
    pub retryable: bool,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Query string for offset listings and searches. The cursor is the
/// `next` of the previous page, passed back as two parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    pub since: Option<f64>,
    pub limit: Option<usize>,
    pub after_id: Option<String>,
    pub after_offset: Option<f64>,
}

impl ListQuery {
    pub fn cursor(&self) -> Option<Cursor> {
        match (&self.after_id, self.after_offset) {
            (Some(key), Some(offset)) => Some(Cursor {
                key: key.clone(),
                offset,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorBody {
    pub after_id: String,
    pub after_offset: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub next: Option<CursorBody>,
}

impl<T> From<Page<T>> for PageResponse<T> {
    fn from(p: Page<T>) -> Self {
        Self {
            items: p.items,
            next: p.next.map(|c| CursorBody {
                after_id: c.key,
                after_offset: c.offset,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<String>,
}

/// One position of a batch answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemOutcome<T> {
    #[serde(rename = "ID")]
    pub id: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReversalResponse {
    pub results: Vec<ItemOutcome<PenaltyRecord>>,
    pub group: Option<ItemOutcome<PenaltyGroup>>,
}

// ---------------------------------------------------------------------------
// Tokens and groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(flatten)]
    pub record: PenaltyRecord,
    #[serde(rename = "Saved")]
    pub saved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverseGroupRequest {
    pub penalty_type: PenaltyType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedMember {
    #[serde(rename = "ID")]
    pub id: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDeleteResponse {
    pub group: PenaltyGroup,
    pub disabled: Vec<String>,
    pub failed: Vec<FailedMember>,
}
