//! Post composer with a single-submission guard.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use shared::protocol::Post;
use tracing::{error, info, warn};

use crate::{
    error::ClientError,
    feed::PostListView,
    service::PostService,
    session::SessionContext,
    surface::{ComposerSurface, Notice, UiError, UiErrorContext},
};

const SUBMIT_LABEL: &str = "Post";
const SUBMITTING_LABEL: &str = "Posting...";
pub const POST_CREATED_NOTICE: &str = "Post created successfully!";

pub struct PostComposer {
    service: Arc<dyn PostService>,
    surface: Arc<dyn ComposerSurface>,
    feed: Arc<PostListView>,
    page_size: u32,
    in_flight: AtomicBool,
}

impl PostComposer {
    pub fn new(
        context: &SessionContext,
        surface: Arc<dyn ComposerSurface>,
        feed: Arc<PostListView>,
        page_size: u32,
    ) -> Self {
        Self::with_service(context.client(), surface, feed, page_size)
    }

    pub fn with_service(
        service: Arc<dyn PostService>,
        surface: Arc<dyn ComposerSurface>,
        feed: Arc<PostListView>,
        page_size: u32,
    ) -> Self {
        Self {
            service,
            surface,
            feed,
            page_size,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn submit(&self, content: &str) -> Result<Post, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            let err = ClientError::Validation("Post content cannot be empty.".into());
            self.surface.notify(Notice::Error(UiError::from_client_error(
                UiErrorContext::CreatePost,
                &err,
            )));
            return Err(err);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ClientError::Validation(
                "a post is already being submitted".into(),
            ));
        }
        let _submitting = SubmitGuard { composer: self };
        self.surface.set_submit_state(false, SUBMITTING_LABEL);

        let outcome = self.service.create_post(content).await;
        match outcome {
            Ok(post) => {
                info!(post_id = %post.id, "post created");
                self.surface.clear_input();
                self.surface
                    .notify(Notice::Info(POST_CREATED_NOTICE.to_string()));
                if let Err(err) = self.feed.refresh(self.page_size, 0).await {
                    warn!(error = %err, "refresh after post creation failed");
                }
                Ok(post)
            }
            Err(err) => {
                error!(error = %err, "failed to create post");
                self.surface.notify(Notice::Error(UiError::from_client_error(
                    UiErrorContext::CreatePost,
                    &err,
                )));
                Err(err)
            }
        }
    }
}

/// Re-enables the composer however `submit` ends, including when its future is dropped.
struct SubmitGuard<'a> {
    composer: &'a PostComposer,
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.composer.surface.set_submit_state(true, SUBMIT_LABEL);
        self.composer.in_flight.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "tests/composer_tests.rs"]
mod tests;
