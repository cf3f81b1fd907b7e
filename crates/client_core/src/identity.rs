//! Identity provider seam and the file-backed provider used by the CLI.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::{
    domain::Principal,
    protocol::{DelegationRequest, DelegationResponse},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::{config::DEFAULT_CALL_TIMEOUT_MS, error::ClientError};

/// Authenticated principal plus the delegation used to sign calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    principal: Principal,
    delegation: String,
    expires_at: DateTime<Utc>,
}

impl Identity {
    pub fn new(principal: Principal, delegation: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            principal,
            delegation: delegation.into(),
            expires_at,
        }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn delegation(&self) -> &str {
        &self.delegation
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.delegation.is_empty() && self.expires_at > now
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

impl From<DelegationResponse> for Identity {
    fn from(value: DelegationResponse) -> Self {
        Self::new(value.principal, value.delegation, value.expires_at)
    }
}

#[derive(Debug, Clone)]
pub struct LoginOptions {
    pub provider_url: String,
    pub max_time_to_live: Option<Duration>,
}

impl LoginOptions {
    pub fn new(provider_url: impl Into<String>) -> Self {
        Self {
            provider_url: provider_url.into(),
            max_time_to_live: None,
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn is_authenticated(&self) -> bool;
    async fn identity(&self) -> Option<Identity>;
    /// Completes when the provider reports success or failure.
    async fn login(&self, options: &LoginOptions) -> Result<Identity, ClientError>;
    async fn logout(&self) -> Result<(), ClientError>;
}

/// Requests delegations from `<provider>/delegate` and keeps the latest one in a JSON file.
pub struct FileIdentityProvider {
    http: Client,
    session_path: PathBuf,
    username: Option<String>,
    request_timeout: Duration,
    cached: Mutex<Option<Identity>>,
}

impl FileIdentityProvider {
    pub fn new(session_path: impl Into<PathBuf>) -> Self {
        Self {
            http: Client::new(),
            session_path: session_path.into(),
            username: None,
            request_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            cached: Mutex::new(None),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Bounds the delegation request so a silent provider cannot hold a login open.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    async fn load(&self) -> Option<Identity> {
        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = read_session_file(&self.session_path).await;
        }

        match cached.as_ref() {
            Some(identity) if identity.is_valid() => Some(identity.clone()),
            Some(identity) => {
                debug!(principal = %identity.principal(), "stored delegation expired");
                *cached = None;
                if let Err(err) = remove_session_file(&self.session_path).await {
                    warn!(error = %err, "failed to discard expired session file");
                }
                None
            }
            None => None,
        }
    }

    async fn persist(&self, identity: &Identity) -> Result<(), ClientError> {
        if let Some(parent) = self
            .session_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent).await.map_err(|err| {
                ClientError::Auth(format!(
                    "failed to create session directory '{}': {err}",
                    parent.display()
                ))
            })?;
        }

        let raw = serde_json::to_vec_pretty(identity)
            .map_err(|err| ClientError::Auth(format!("failed to encode session: {err}")))?;
        tokio::fs::write(&self.session_path, raw).await.map_err(|err| {
            ClientError::Auth(format!(
                "failed to write session file '{}': {err}",
                self.session_path.display()
            ))
        })
    }
}

#[async_trait]
impl IdentityProvider for FileIdentityProvider {
    async fn is_authenticated(&self) -> bool {
        self.load().await.is_some()
    }

    async fn identity(&self) -> Option<Identity> {
        self.load().await
    }

    async fn login(&self, options: &LoginOptions) -> Result<Identity, ClientError> {
        let username = self
            .username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ClientError::Auth("no username supplied for login".into()))?;

        let url = delegation_url(&options.provider_url)?;
        debug!(%url, "requesting delegation");
        let response: DelegationResponse = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(&DelegationRequest {
                username: username.to_string(),
                max_time_to_live_secs: options.max_time_to_live.map(|ttl| ttl.as_secs()),
            })
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| {
                if err.is_timeout() {
                    ClientError::Auth(format!(
                        "identity provider did not answer within {:?}",
                        self.request_timeout
                    ))
                } else {
                    ClientError::Auth(format!("identity provider rejected login: {err}"))
                }
            })?
            .json()
            .await
            .map_err(|err| ClientError::Auth(format!("malformed delegation: {err}")))?;

        let identity = Identity::from(response);
        if !identity.is_valid() {
            return Err(ClientError::Auth(
                "identity provider issued an expired delegation".into(),
            ));
        }

        self.persist(&identity).await?;
        *self.cached.lock().await = Some(identity.clone());
        info!(principal = %identity.principal(), "delegation stored");
        Ok(identity)
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.cached.lock().await.take();
        remove_session_file(&self.session_path)
            .await
            .map_err(|err| ClientError::Auth(format!("failed to remove session file: {err}")))
    }
}

/// Strips the `#authorize` fragment and appends the `delegate` path segment.
fn delegation_url(provider_url: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(provider_url)
        .map_err(|err| ClientError::Configuration(format!("invalid provider url: {err}")))?;
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|_| ClientError::Configuration(format!("provider url cannot be a base: {provider_url}")))?
        .pop_if_empty()
        .push("delegate");
    Ok(url)
}

async fn read_session_file(path: &Path) -> Option<Identity> {
    let raw = tokio::fs::read(path).await.ok()?;
    match serde_json::from_slice(&raw) {
        Ok(identity) => Some(identity),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable session file");
            None
        }
    }
}

async fn remove_session_file(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "tests/identity_tests.rs"]
mod tests;
