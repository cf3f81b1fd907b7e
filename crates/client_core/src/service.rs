//! Signed handle to the remote post ledger and the factory that builds it.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Network, PostId},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{
        CreatePostRequest, LikePostResponse, ListPostsQuery, Post, PRINCIPAL_HEADER,
        SIGNATURE_HEADER,
    },
};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    config::ClientSettings,
    error::{ClientError, RemoteFailure},
    identity::Identity,
    trust::{fetch_root_key, RootKey},
};

#[async_trait]
pub trait PostService: Send + Sync {
    async fn list_posts(&self, limit: u32, offset: u32) -> Result<Vec<Post>, ClientError>;
    async fn create_post(&self, content: &str) -> Result<Post, ClientError>;
    async fn like_post(&self, id: PostId) -> Result<bool, ClientError>;
    async fn get_post(&self, id: PostId) -> Result<Option<Post>, ClientError>;
}

pub struct ServiceClientFactory {
    http: Client,
    network: Network,
    service_url: Option<String>,
    configured_root_key: Option<String>,
    call_timeout: Duration,
    bootstrap_outcome: OnceCell<Result<RootKey, String>>,
}

impl ServiceClientFactory {
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            http: Client::new(),
            network: settings.network,
            service_url: settings.service_url.clone(),
            configured_root_key: settings.root_key_b64.clone(),
            call_timeout: settings.call_timeout(),
            bootstrap_outcome: OnceCell::new(),
        }
    }

    pub async fn build(&self, identity: Option<&Identity>) -> Result<HttpServiceClient, ClientError> {
        self.build_with_cancel(identity, CancellationToken::new())
            .await
    }

    /// Builds a client whose in-flight calls all abort when `cancel` fires.
    pub async fn build_with_cancel(
        &self,
        identity: Option<&Identity>,
        cancel: CancellationToken,
    ) -> Result<HttpServiceClient, ClientError> {
        let identity = identity
            .ok_or_else(|| ClientError::Configuration("no authenticated identity".into()))?;
        if !identity.is_valid() {
            return Err(ClientError::Configuration(format!(
                "identity for {} is no longer authenticated",
                identity.principal()
            )));
        }

        let base_url = self.base_url()?;
        let root_key = self.root_key(&base_url).await?;

        debug!(principal = %identity.principal(), url = %base_url, "built service client");
        Ok(HttpServiceClient {
            http: self.http.clone(),
            base_url,
            identity: identity.clone(),
            root_key,
            call_timeout: self.call_timeout,
            cancel,
        })
    }

    fn base_url(&self) -> Result<Url, ClientError> {
        let raw = self
            .service_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ClientError::Configuration("service_url is not configured".into()))?;
        let normalized = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        Url::parse(&normalized)
            .map_err(|err| ClientError::Configuration(format!("invalid service_url '{raw}': {err}")))
    }

    /// Non-production networks always verify against the key the replica reports;
    /// a configured key there must match it.
    async fn root_key(&self, base_url: &Url) -> Result<RootKey, ClientError> {
        let configured = self
            .configured_root_key
            .as_deref()
            .map(RootKey::from_base64)
            .transpose()?;
        if self.network.is_production() {
            return configured.ok_or_else(|| {
                ClientError::Configuration(
                    "root_key_b64 is required on the production network".into(),
                )
            });
        }

        let fetched = self.bootstrap(base_url).await?;
        match configured {
            Some(expected) if expected != fetched => Err(ClientError::Configuration(format!(
                "configured root_key_b64 does not match the key reported by {base_url}"
            ))),
            _ => Ok(fetched),
        }
    }

    /// Runs at most once per factory. A failure is kept and returned to every later build.
    async fn bootstrap(&self, base_url: &Url) -> Result<RootKey, ClientError> {
        self.bootstrap_outcome
            .get_or_init(|| async {
                info!(url = %base_url, "bootstrapping trust for non-production network");
                fetch_root_key(&self.http, base_url, self.call_timeout)
                    .await
                    .map_err(|err| match err {
                        ClientError::Configuration(reason) => reason,
                        other => other.to_string(),
                    })
            })
            .await
            .clone()
            .map_err(ClientError::Configuration)
    }
}

#[derive(Clone)]
pub struct HttpServiceClient {
    http: Client,
    base_url: Url,
    identity: Identity,
    root_key: RootKey,
    call_timeout: Duration,
    cancel: CancellationToken,
}

impl HttpServiceClient {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn into_shared(self) -> Arc<dyn PostService> {
        Arc::new(self)
    }

    fn endpoint(&self, operation: &'static str, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|err| ClientError::remote(operation, RemoteFailure::Transport(err.to_string())))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let body = self.execute(operation, request).await?;
        serde_json::from_slice(&body)
            .map_err(|err| ClientError::remote(operation, RemoteFailure::Decode(err.to_string())))
    }

    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Vec<u8>, ClientError> {
        let request = request
            .bearer_auth(self.identity.delegation())
            .header(PRINCIPAL_HEADER, self.identity.principal().as_str());

        let call_cancel = self.cancel.child_token();
        let exchange = async {
            let response = request.send().await.map_err(|err| {
                ClientError::remote(operation, RemoteFailure::Transport(err.to_string()))
            })?;
            let status = response.status();
            let signature = response
                .headers()
                .get(SIGNATURE_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            let body = response.bytes().await.map_err(|err| {
                ClientError::remote(operation, RemoteFailure::Transport(err.to_string()))
            })?;
            Ok::<_, ClientError>((status, signature, body))
        };

        let (status, signature, body) = tokio::select! {
            biased;
            _ = call_cancel.cancelled() => {
                warn!(operation, "remote call cancelled");
                return Err(ClientError::remote(operation, RemoteFailure::Cancelled));
            }
            outcome = tokio::time::timeout(self.call_timeout, exchange) => match outcome {
                Ok(result) => result?,
                Err(_) => {
                    warn!(operation, timeout_ms = self.call_timeout.as_millis() as u64, "remote call timed out");
                    return Err(ClientError::remote(
                        operation,
                        RemoteFailure::Timeout(self.call_timeout),
                    ));
                }
            },
        };

        if !status.is_success() {
            let api_error = serde_json::from_slice::<ApiError>(&body).unwrap_or_else(|_| {
                ApiError::new(
                    ErrorCode::from_http_status(status.as_u16()),
                    String::from_utf8_lossy(&body).into_owned(),
                )
            });
            return Err(ClientError::remote(
                operation,
                RemoteFailure::Api {
                    status: status.as_u16(),
                    source: ApiException::from(api_error),
                },
            ));
        }

        let signature = signature.ok_or_else(|| {
            ClientError::remote(
                operation,
                RemoteFailure::Signature(format!("missing {SIGNATURE_HEADER} header")),
            )
        })?;
        self.root_key
            .verify(&body, &signature)
            .map_err(|reason| ClientError::remote(operation, RemoteFailure::Signature(reason)))?;

        debug!(operation, bytes = body.len(), "remote call completed");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl PostService for HttpServiceClient {
    async fn list_posts(&self, limit: u32, offset: u32) -> Result<Vec<Post>, ClientError> {
        let url = self.endpoint("list_posts", "posts")?;
        self.call(
            "list_posts",
            self.http.get(url).query(&ListPostsQuery { limit, offset }),
        )
        .await
    }

    async fn create_post(&self, content: &str) -> Result<Post, ClientError> {
        let url = self.endpoint("create_post", "posts")?;
        self.call(
            "create_post",
            self.http.post(url).json(&CreatePostRequest {
                content: content.to_string(),
            }),
        )
        .await
    }

    async fn like_post(&self, id: PostId) -> Result<bool, ClientError> {
        let url = self.endpoint("like_post", &format!("posts/{}/like", id.0))?;
        let response: LikePostResponse = self.call("like_post", self.http.post(url)).await?;
        Ok(response.liked)
    }

    async fn get_post(&self, id: PostId) -> Result<Option<Post>, ClientError> {
        let url = self.endpoint("get_post", &format!("posts/{}", id.0))?;
        match self.call("get_post", self.http.get(url)).await {
            Ok(post) => Ok(Some(post)),
            Err(err) if err.remote_status() == Some(404) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;
