//! Post list view: fetch a page, normalize ordering, render, and own the per-render like controls.

use std::{
    cmp::Reverse,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use shared::{domain::PostId, protocol::Post};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::{
    error::ClientError,
    like::LikeControl,
    service::PostService,
    session::SessionContext,
    surface::{LikeSurface, PostCard, PostListSurface, UiError, UiErrorContext},
};

pub const EMPTY_FEED_MESSAGE: &str = "No posts yet. Be the first to post!";

#[derive(Default)]
struct RenderedFeed {
    posts: Vec<Post>,
    controls: Vec<Arc<LikeControl>>,
}

pub struct PostListView {
    service: Arc<dyn PostService>,
    surface: Arc<dyn PostListSurface>,
    like_surface: Arc<dyn LikeSurface>,
    generation: Arc<AtomicU64>,
    rendered: Mutex<RenderedFeed>,
}

impl PostListView {
    pub fn new(
        context: &SessionContext,
        surface: Arc<dyn PostListSurface>,
        like_surface: Arc<dyn LikeSurface>,
    ) -> Self {
        Self::with_service(context.client(), surface, like_surface)
    }

    pub fn with_service(
        service: Arc<dyn PostService>,
        surface: Arc<dyn PostListSurface>,
        like_surface: Arc<dyn LikeSurface>,
    ) -> Self {
        Self {
            service,
            surface,
            like_surface,
            generation: Arc::new(AtomicU64::new(0)),
            rendered: Mutex::new(RenderedFeed::default()),
        }
    }

    /// Replaces the whole render with the requested page.
    ///
    /// Holding the render lock for the duration serializes overlapping refreshes,
    /// so the last one to start is the one left on screen.
    pub async fn refresh(&self, limit: u32, offset: u32) -> Result<(), ClientError> {
        let mut rendered = self.rendered.lock().await;
        self.surface.show_loading();

        let outcome = self.service.list_posts(limit, offset).await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *rendered = RenderedFeed::default();

        let mut posts = match outcome {
            Ok(posts) => posts,
            Err(err) => {
                error!(error = %err, limit, offset, "failed to load posts");
                let ui = UiError::from_client_error(UiErrorContext::LoadPosts, &err);
                self.surface.show_error(ui.message());
                return Err(err);
            }
        };

        if posts.is_empty() {
            self.surface.show_empty(EMPTY_FEED_MESSAGE);
            return Ok(());
        }

        sort_newest_first(&mut posts);
        *rendered = self.render_posts(posts, generation);
        Ok(())
    }

    /// Renders a single post, e.g. one the user addressed directly that is not on
    /// the current page. Returns its like control, or `None` if the post does not exist.
    pub async fn show_post(&self, id: PostId) -> Result<Option<Arc<LikeControl>>, ClientError> {
        let mut rendered = self.rendered.lock().await;
        self.surface.show_loading();

        let outcome = self.service.get_post(id).await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *rendered = RenderedFeed::default();

        match outcome {
            Ok(Some(post)) => {
                *rendered = self.render_posts(vec![post], generation);
                Ok(rendered.controls.first().cloned())
            }
            Ok(None) => {
                self.surface.show_empty(&format!("Post {id} was not found."));
                Ok(None)
            }
            Err(err) => {
                error!(error = %err, post_id = %id, "failed to load post");
                let ui = UiError::from_client_error(UiErrorContext::LoadPosts, &err);
                self.surface.show_error(ui.message());
                Err(err)
            }
        }
    }

    pub fn service(&self) -> Arc<dyn PostService> {
        Arc::clone(&self.service)
    }

    fn render_posts(&self, posts: Vec<Post>, generation: u64) -> RenderedFeed {
        let cards: Vec<PostCard> = posts.iter().map(PostCard::from_post).collect();
        let controls = posts
            .iter()
            .map(|post| {
                Arc::new(LikeControl::new(
                    post,
                    Arc::clone(&self.service),
                    Arc::clone(&self.like_surface),
                    Arc::clone(&self.generation),
                    generation,
                ))
            })
            .collect();

        debug!(count = posts.len(), generation, "rendering posts");
        self.surface.render(&cards);
        RenderedFeed { posts, controls }
    }

    pub async fn posts(&self) -> Vec<Post> {
        self.rendered.lock().await.posts.clone()
    }

    pub async fn like_control(&self, id: PostId) -> Option<Arc<LikeControl>> {
        self.rendered
            .lock()
            .await
            .controls
            .iter()
            .find(|control| control.post_id() == id)
            .cloned()
    }

    pub async fn displayed_likes(&self, id: PostId) -> Option<u64> {
        let control = self.like_control(id).await?;
        Some(control.displayed_count().await)
    }
}

/// Newest first; equal timestamps fall back to the larger id.
pub fn sort_newest_first(posts: &mut [Post]) {
    posts.sort_by_key(|post| Reverse((post.timestamp, post.id)));
}

#[cfg(test)]
#[path = "tests/feed_tests.rs"]
mod tests;
