//! Client core for the recipro post ledger: session lifecycle, the signed service
//! client, and the controllers that map user actions onto remote calls.

pub mod auth_control;
pub mod composer;
pub mod config;
pub mod error;
pub mod feed;
pub mod identity;
pub mod like;
pub mod service;
pub mod session;
pub mod surface;
pub mod trust;

pub use auth_control::AuthControl;
pub use composer::PostComposer;
pub use config::{load_settings, load_settings_from, ClientSettings};
pub use error::{ClientError, RemoteFailure};
pub use feed::PostListView;
pub use identity::{FileIdentityProvider, Identity, IdentityProvider, LoginOptions};
pub use like::{LikeControl, LikeCounter, LikeStatus};
pub use service::{HttpServiceClient, PostService, ServiceClientFactory};
pub use session::{SessionContext, SessionManager, SessionState};
pub use surface::{
    AuthSurface, ComposerSurface, LikeSurface, Navigator, Notice, PostCard, PostListSurface,
    Route, UiError, UiErrorCategory, UiErrorContext,
};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
