use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{PostId, Principal};

/// Response header carrying the base64 Ed25519 signature over the raw body.
pub const SIGNATURE_HEADER: &str = "x-ledger-signature";
/// Request header naming the calling principal.
pub const PRINCIPAL_HEADER: &str = "x-ledger-principal";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: Principal,
    pub content: String,
    /// Nanoseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default)]
    pub likes: u64,
}

impl Post {
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        let secs = (self.timestamp / 1_000_000_000) as i64;
        let nanos = (self.timestamp % 1_000_000_000) as u32;
        DateTime::from_timestamp(secs, nanos)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListPostsQuery {
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LikePostResponse {
    pub liked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Base64 encoded Ed25519 public key of the network.
    pub root_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_time_to_live_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationResponse {
    pub principal: Principal,
    pub delegation: String,
    pub expires_at: DateTime<Utc>,
}
