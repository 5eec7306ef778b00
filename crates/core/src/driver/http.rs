//! Activation driver that delegates to a browser-automation sidecar over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DriverConfig;
use crate::workers::WorkerCredentials;

use super::{ActivationDriver, ActivationOutcome, DriverError};

#[derive(Serialize)]
struct ActivateRequest<'a> {
    identity: &'a str,
    secret: &'a str,
    uid: &'a str,
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct ActivateResponse {
    result: String,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the activation sidecar.
///
/// The sidecar answers `{"result": "SUCCESS" | "CAPTCHA" | "ALREADY_REDEEMED" | "ERROR",
/// "message": "..."}`.
pub struct HttpActivationDriver {
    client: Client,
    config: DriverConfig,
}

impl HttpActivationDriver {
    pub fn new(config: DriverConfig) -> Result<Self, DriverError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DriverError::Failed(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn map_transport(e: reqwest::Error) -> DriverError {
        if e.is_timeout() {
            DriverError::Timeout
        } else if e.is_connect() {
            DriverError::Connection(e.to_string())
        } else {
            DriverError::Failed(e.to_string())
        }
    }

    fn parse_outcome(response: ActivateResponse) -> Result<ActivationOutcome, DriverError> {
        match response.result.to_ascii_uppercase().as_str() {
            "SUCCESS" => Ok(ActivationOutcome::Activated),
            "CAPTCHA" => Ok(ActivationOutcome::CaptchaOrLockout),
            "ALREADY_REDEEMED" => Ok(ActivationOutcome::AlreadyRedeemed),
            "ERROR" => Ok(ActivationOutcome::RedemptionError(
                response
                    .message
                    .unwrap_or_else(|| "unspecified".to_string()),
            )),
            other => Err(DriverError::Failed(format!(
                "unknown activation result: {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl ActivationDriver for HttpActivationDriver {
    fn name(&self) -> &str {
        "http"
    }

    async fn activate(
        &self,
        worker: &WorkerCredentials,
        uid: &str,
        code: &str,
    ) -> Result<ActivationOutcome, DriverError> {
        let body = ActivateRequest {
            identity: &worker.identity,
            secret: &worker.secret,
            uid,
            code,
        };

        let mut request = self.client.post(&self.config.url).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.header("X-API-Key", key);
        }

        let response = request.send().await.map_err(Self::map_transport)?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DriverError::Failed(format!(
                "sidecar returned {}: {}",
                status.as_u16(),
                text.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ActivateResponse = response
            .json()
            .await
            .map_err(|e| DriverError::Failed(format!("failed to parse response: {}", e)))?;

        debug!(worker = %worker.identity, result = %parsed.result, "Sidecar answered");
        Self::parse_outcome(parsed)
    }
}
