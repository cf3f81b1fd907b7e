//! Network root key handling: the one-time bootstrap on non-production networks
//! and per-response signature verification.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signature, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH};
use reqwest::Client;
use shared::protocol::StatusResponse;
use tracing::{info, warn};
use url::Url;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootKey(VerifyingKey);

impl RootKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ClientError> {
        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            ClientError::Configuration(format!(
                "root key must be {PUBLIC_KEY_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        VerifyingKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|err| ClientError::Configuration(format!("invalid root key: {err}")))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, ClientError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|err| ClientError::Configuration(format!("root key is not base64: {err}")))?;
        Self::from_bytes(&bytes)
    }

    /// Checks a base64 signature header value against `body`.
    pub fn verify(&self, body: &[u8], signature_b64: &str) -> Result<(), String> {
        let raw = STANDARD
            .decode(signature_b64.trim())
            .map_err(|err| format!("signature is not base64: {err}"))?;
        let signature =
            Signature::from_slice(&raw).map_err(|err| format!("malformed signature: {err}"))?;
        self.0
            .verify(body, &signature)
            .map_err(|_| "signature does not match network root key".to_string())
    }
}

/// Fetches the verification root from `<base>/api/v2/status`.
///
/// Required once before the first call against a local replica; failures are
/// configuration errors and are not retried.
pub async fn fetch_root_key(
    http: &Client,
    base_url: &Url,
    timeout: Duration,
) -> Result<RootKey, ClientError> {
    let status_url = base_url
        .join("api/v2/status")
        .map_err(|err| ClientError::Configuration(format!("invalid status url: {err}")))?;

    let response = http
        .get(status_url.clone())
        .timeout(timeout)
        .send()
        .await
        .and_then(|res| res.error_for_status())
        .map_err(|err| {
            warn!(url = %status_url, error = %err, "trust bootstrap request failed");
            ClientError::Configuration(format!("failed to fetch network root key: {err}"))
        })?;

    let status: StatusResponse = response.json().await.map_err(|err| {
        ClientError::Configuration(format!("malformed status response: {err}"))
    })?;
    let key = RootKey::from_base64(&status.root_key)?;
    info!(url = %status_url, "fetched network root key");
    Ok(key)
}
