use std::time::Duration;

use penalty_schemas::{DecodedToken, OraclePayment, PaymentNotification, PaymentsResponse};
use reqwest::StatusCode;
use serde::Serialize;

use crate::{NotificationSink, PaymentOracle, TokenDecoder, UpstreamError, UpstreamResult};

const ORACLE: &str = "payment-oracle";
const DECODER: &str = "token-decoder";
const SINK: &str = "notification-sink";

/// Shared client for every upstream, with a per-request timeout.
pub fn http_client(timeout: Duration) -> UpstreamResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| UpstreamError::Transport {
            service: "http-client",
            message: e.to_string(),
        })
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn transport(service: &'static str) -> impl Fn(reqwest::Error) -> UpstreamError {
    move |e| UpstreamError::Transport {
        service,
        message: e.without_url().to_string(),
    }
}

async fn api_error(service: &'static str, resp: reqwest::Response) -> UpstreamError {
    let status = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    UpstreamError::Api {
        service,
        status,
        message: message.chars().take(512).collect(),
    }
}

// ---------------------------------------------------------------------------
// Payment oracle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpPaymentOracle {
    http: reqwest::Client,
    base_url: String,
}

impl HttpPaymentOracle {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }
}

#[derive(Serialize)]
struct PaymentsRequest<'a> {
    ids: &'a [String],
}

#[async_trait::async_trait]
impl PaymentOracle for HttpPaymentOracle {
    async fn fetch_payments(&self, ids: &[String]) -> UpstreamResult<Vec<OraclePayment>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let resp = self
            .http
            .post(join_url(&self.base_url, "payments/batch"))
            .json(&PaymentsRequest { ids })
            .send()
            .await
            .map_err(transport(ORACLE))?;

        if !resp.status().is_success() {
            return Err(api_error(ORACLE, resp).await);
        }

        let body: PaymentsResponse = resp.json().await.map_err(|e| UpstreamError::Decode {
            service: ORACLE,
            message: e.to_string(),
        })?;
        Ok(body.payments)
    }
}

// ---------------------------------------------------------------------------
// Token decoder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpTokenDecoder {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTokenDecoder {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }
}

#[async_trait::async_trait]
impl TokenDecoder for HttpTokenDecoder {
    async fn decode(&self, token: &str) -> UpstreamResult<DecodedToken> {
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(UpstreamError::BadToken);
        }

        let resp = self
            .http
            .get(join_url(&self.base_url, &format!("tokens/{token}")))
            .send()
            .await
            .map_err(transport(DECODER))?;

        match resp.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => return Err(UpstreamError::BadToken),
            _ => return Err(api_error(DECODER, resp).await),
        }

        resp.json().await.map_err(|e| UpstreamError::Decode {
            service: DECODER,
            message: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Notification sink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpNotificationSink {
    http: reqwest::Client,
    base_url: String,
}

impl HttpNotificationSink {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }
}

#[async_trait::async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn publish(&self, topic: &str, message: &PaymentNotification) -> UpstreamResult<()> {
        let resp = self
            .http
            .post(join_url(&self.base_url, &format!("topics/{topic}/messages")))
            .json(message)
            .send()
            .await
            .map_err(transport(SINK))?;

        if !resp.status().is_success() {
            return Err(api_error(SINK, resp).await);
        }
        Ok(())
    }
}

/// Sink used when no sink URL is configured: notifications are logged and dropped.
#[derive(Debug, Clone, Default)]
pub struct LogOnlySink;

#[async_trait::async_trait]
impl NotificationSink for LogOnlySink {
    async fn publish(&self, topic: &str, message: &PaymentNotification) -> UpstreamResult<()> {
        tracing::info!(
            topic,
            id = %message.id,
            status = message.payment_status.as_str(),
            "notification sink not configured; message dropped"
        );
        Ok(())
    }
}
