use penalty_store::StoreError;
use penalty_upstream::UpstreamError;

/// Error taxonomy for every engine operation.
///
/// Store condition failures surface as `Conflict`: the caller should refetch,
/// never retry blindly. Only `Upstream` and `Persistence` are retryable.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("conflict on {id}: {reason}")]
    Conflict { id: String, reason: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Upstream(UpstreamError),
    #[error(transparent)]
    Persistence(StoreError),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn conflict(id: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Conflict {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Upstream(_) | EngineError::Persistence(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConditionFailed { key, .. } => {
                EngineError::conflict(key, "stored version changed; refetch and retry")
            }
            StoreError::NotFound { key, .. } => EngineError::NotFound(key),
            other => EngineError::Persistence(other),
        }
    }
}

impl From<UpstreamError> for EngineError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::BadToken => EngineError::Validation(e.to_string()),
            other => EngineError::Upstream(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_taxonomy() {
        let e: EngineError = StoreError::ConditionFailed {
            table: "penalty_documents",
            key: "1_FPN".into(),
        }
        .into();
        assert!(matches!(e, EngineError::Conflict { ref id, .. } if id == "1_FPN"));
        assert!(!e.is_retryable());

        let e: EngineError = StoreError::Backend("pool timed out".into()).into();
        assert!(matches!(e, EngineError::Persistence(_)));
        assert!(e.is_retryable());
    }

    #[test]
    fn bad_token_is_a_validation_error() {
        let e: EngineError = UpstreamError::BadToken.into();
        assert!(matches!(e, EngineError::Validation(_)));

        let e: EngineError = UpstreamError::Api {
            service: "payment-oracle",
            status: 500,
            message: String::new(),
        }
        .into();
        assert!(e.is_retryable());
    }
}
