//! Error taxonomy for the client: auth, configuration, local validation and remote calls.

use std::time::Duration;

use shared::error::ApiException;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote returned status {status}: {source}")]
    Api {
        status: u16,
        #[source]
        source: ApiException,
    },
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
    #[error("call cancelled")]
    Cancelled,
    #[error("response signature rejected: {0}")]
    Signature(String),
    #[error("remote rejected the request")]
    Rejected,
    #[error("failed to decode response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("{operation} failed: {reason}")]
    RemoteCall {
        operation: &'static str,
        #[source]
        reason: RemoteFailure,
    },
}

impl ClientError {
    pub fn remote(operation: &'static str, reason: RemoteFailure) -> Self {
        Self::RemoteCall { operation, reason }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ClientError::Validation(_))
    }

    /// Remote status of a failed call, if the service answered at all.
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            ClientError::RemoteCall {
                reason: RemoteFailure::Api { status, .. },
                ..
            } => Some(*status),
            _ => None,
        }
    }

    /// Collapses any error raised during a login/logout flow into `Auth`.
    pub(crate) fn into_auth(self) -> Self {
        match self {
            ClientError::Auth(_) => self,
            other => ClientError::Auth(other.to_string()),
        }
    }
}
