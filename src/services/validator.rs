use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, instrument, warn};

use crate::config::StoreConfig;
use crate::error::{ErrorCode, Result, Severity, StoreError};
use crate::models::validate::{ValidateRequest, ValidateResponse};

/// The receipt validation backend.
///
/// The HTTP implementation below talks to the validation server; tests
/// substitute their own.
#[async_trait]
pub trait ReceiptValidator: Send + Sync {
    /// Submit a receipt for validation and return the raw envelope.
    ///
    /// A business rejection (expired subscription, bogus receipt) is an `Ok`
    /// envelope with `ok: false`; `Err` means the round trip itself failed.
    async fn validate(&self, request: &ValidateRequest) -> Result<ValidateResponse>;
}

pub struct HttpValidator {
    base_url: String,
    authorization: String,
    http_client: reqwest::Client,
}

impl HttpValidator {
    pub fn new(config: &StoreConfig) -> Self {
        let credentials = format!("{}:{}", config.app_name, config.public_key);
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            authorization: format!("Basic {}", BASE64.encode(credentials)),
            http_client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ReceiptValidator for HttpValidator {
    #[instrument(skip(self, request), fields(id = %request.id))]
    async fn validate(&self, request: &ValidateRequest) -> Result<ValidateResponse> {
        let url = format!("{}/v1/validate", self.base_url);
        debug!("validating transaction {}", request.transaction_id());

        let response = self
            .http_client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.authorization.as_str())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                StoreError::new(
                    Severity::Error,
                    ErrorCode::Communication,
                    format!("Failed to reach the validation server: {e}"),
                )
            })?;

        let status = response.status();
        let envelope: ValidateResponse = response.json().await.map_err(|e| {
            StoreError::new(
                Severity::Error,
                ErrorCode::BadResponse,
                format!("Invalid validator response: {e}"),
            )
            .with_status(status.as_u16())
        })?;

        if !envelope.ok {
            warn!(
                code = ?envelope.code,
                message = envelope.message.as_deref().unwrap_or(""),
                "validator rejected transaction {}",
                request.transaction_id()
            );
        }
        Ok(envelope)
    }
}
