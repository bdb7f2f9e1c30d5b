//! penalty-upstream
//!
//! The three external collaborators of the engine, each behind a trait:
//!
//! - [`PaymentOracle`]: authoritative payment status by document ID.
//! - [`TokenDecoder`]: payment token to (reference, type, amount).
//! - [`NotificationSink`]: fire-and-forget payment notifications.
//!
//! HTTP implementations live in [`http`]. Base URLs are passed in by the
//! caller (read from env by penalty-config); they are never logged.

use penalty_schemas::{DecodedToken, OraclePayment, PaymentNotification};

pub mod http;

pub use http::{http_client, HttpNotificationSink, HttpPaymentOracle, HttpTokenDecoder, LogOnlySink};

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },
    #[error("{service} returned HTTP {status}: {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },
    #[error("{service} response could not be decoded: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
    #[error("payment token could not be decoded")]
    BadToken,
}

impl UpstreamError {
    pub fn service(&self) -> &'static str {
        match self {
            UpstreamError::Transport { service, .. }
            | UpstreamError::Api { service, .. }
            | UpstreamError::Decode { service, .. } => service,
            UpstreamError::BadToken => "token-decoder",
        }
    }
}

pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;

#[async_trait::async_trait]
pub trait PaymentOracle: Send + Sync {
    /// Payments known for `ids`. IDs with no payment are simply absent.
    async fn fetch_payments(&self, ids: &[String]) -> UpstreamResult<Vec<OraclePayment>>;
}

#[async_trait::async_trait]
pub trait TokenDecoder: Send + Sync {
    /// `BadToken` when the service rejects the token.
    async fn decode(&self, token: &str) -> UpstreamResult<DecodedToken>;
}

#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, topic: &str, message: &PaymentNotification) -> UpstreamResult<()>;
}
