//! Rendering seams the controllers drive, plus user-facing notice modeling.

use chrono::Local;
use shared::{
    domain::{PostId, Principal},
    protocol::Post,
};

use crate::error::{ClientError, RemoteFailure};

/// Where the session manager sends the user after a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Landing,
    Feed,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Landing => "/",
            Route::Feed => "/content.html",
        }
    }
}

pub trait Navigator: Send + Sync {
    fn redirect(&self, route: Route);
}

/// Render model for a single post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCard {
    pub id: PostId,
    pub content: String,
    pub author: String,
    pub posted_at: String,
    pub likes: u64,
}

impl PostCard {
    pub fn from_post(post: &Post) -> Self {
        let posted_at = post
            .posted_at()
            .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "unknown time".to_string());
        Self {
            id: post.id,
            content: post.content.clone(),
            author: post.author.abbreviated(),
            posted_at,
            likes: post.likes,
        }
    }
}

pub trait PostListSurface: Send + Sync {
    fn show_loading(&self);
    fn show_empty(&self, message: &str);
    fn show_error(&self, message: &str);
    /// Replaces whatever was rendered before.
    fn render(&self, cards: &[PostCard]);
}

pub trait ComposerSurface: Send + Sync {
    fn set_submit_state(&self, enabled: bool, label: &str);
    fn clear_input(&self);
    fn notify(&self, notice: Notice);
}

pub trait LikeSurface: Send + Sync {
    fn set_like_enabled(&self, post_id: PostId, enabled: bool);
    fn set_liked(&self, post_id: PostId, liked: bool);
    fn set_like_count(&self, post_id: PostId, count: u64);
    fn notify(&self, notice: Notice);
}

pub trait AuthSurface: Send + Sync {
    fn show_signed_in(&self, principal: &Principal);
    fn show_signed_out(&self);
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Auth,
    Configuration,
    Validation,
    Transport,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    Login,
    Logout,
    LoadPosts,
    CreatePost,
    LikePost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_client_error(context: UiErrorContext, err: &ClientError) -> Self {
        let category = match err {
            ClientError::Auth(_) => UiErrorCategory::Auth,
            ClientError::Configuration(_) => UiErrorCategory::Configuration,
            ClientError::Validation(_) => UiErrorCategory::Validation,
            ClientError::RemoteCall { reason, .. } => match reason {
                RemoteFailure::Transport(_)
                | RemoteFailure::Timeout(_)
                | RemoteFailure::Cancelled => UiErrorCategory::Transport,
                RemoteFailure::Api { status: 401, .. } | RemoteFailure::Api { status: 403, .. } => {
                    UiErrorCategory::Auth
                }
                _ => UiErrorCategory::Remote,
            },
        };

        let message = match (context, err) {
            (_, ClientError::Validation(detail)) => detail.clone(),
            (UiErrorContext::Login, _) => "Login failed. Please try again.".to_string(),
            (UiErrorContext::Logout, _) => "Logout failed. Please try again.".to_string(),
            (UiErrorContext::LoadPosts, _) => "Failed to load posts. Please try again.".to_string(),
            (
                UiErrorContext::LikePost,
                ClientError::RemoteCall {
                    reason: RemoteFailure::Rejected,
                    ..
                },
            ) => "Could not like post.".to_string(),
            (UiErrorContext::CreatePost, err) => format!("Failed to create post: {err}"),
            (UiErrorContext::LikePost, err) => format!("Failed to like post: {err}"),
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == UiErrorCategory::Auth
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
