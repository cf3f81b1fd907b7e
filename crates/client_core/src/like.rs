//! Like control with an optimistic counter.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use shared::{domain::PostId, protocol::Post};
use tracing::{debug, info, warn};

use crate::{
    error::{ClientError, RemoteFailure},
    service::PostService,
    surface::{LikeSurface, Notice, UiError, UiErrorContext},
};

/// Displayed like count: the last authoritative value plus likes applied locally since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LikeCounter {
    last_known_remote: u64,
    local_delta: u64,
}

impl LikeCounter {
    pub fn new(remote: u64) -> Self {
        Self {
            last_known_remote: remote,
            local_delta: 0,
        }
    }

    pub fn displayed(&self) -> u64 {
        self.last_known_remote.saturating_add(self.local_delta)
    }

    pub fn local_delta(&self) -> u64 {
        self.local_delta
    }

    pub fn record_like(&mut self) {
        self.local_delta = self.local_delta.saturating_add(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeStatus {
    Idle,
    InFlight,
    Liked,
}

struct LikeState {
    counter: LikeCounter,
    status: LikeStatus,
}

/// One like button for one post in one render.
pub struct LikeControl {
    post_id: PostId,
    service: Arc<dyn PostService>,
    surface: Arc<dyn LikeSurface>,
    current_generation: Arc<AtomicU64>,
    generation: u64,
    state: Mutex<LikeState>,
}

impl LikeControl {
    pub(crate) fn new(
        post: &Post,
        service: Arc<dyn PostService>,
        surface: Arc<dyn LikeSurface>,
        current_generation: Arc<AtomicU64>,
        generation: u64,
    ) -> Self {
        Self {
            post_id: post.id,
            service,
            surface,
            current_generation,
            generation,
            state: Mutex::new(LikeState {
                counter: LikeCounter::new(post.likes),
                status: LikeStatus::Idle,
            }),
        }
    }

    pub fn post_id(&self) -> PostId {
        self.post_id
    }

    pub async fn displayed_count(&self) -> u64 {
        self.lock_state().counter.displayed()
    }

    pub async fn counter(&self) -> LikeCounter {
        self.lock_state().counter
    }

    pub async fn status(&self) -> LikeStatus {
        self.lock_state().status
    }

    fn lock_state(&self) -> MutexGuard<'_, LikeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A control from an earlier render no longer owns what is on screen.
    fn is_stale(&self) -> bool {
        self.current_generation.load(Ordering::SeqCst) != self.generation
    }

    /// Returns the displayed count after a successful like.
    pub async fn like(&self) -> Result<u64, ClientError> {
        {
            let mut state = self.lock_state();
            match state.status {
                LikeStatus::Idle => state.status = LikeStatus::InFlight,
                LikeStatus::InFlight => {
                    return Err(ClientError::Validation("like already in progress".into()))
                }
                LikeStatus::Liked => {
                    return Err(ClientError::Validation("post already liked".into()))
                }
            }
        }
        let _in_flight = InFlightGuard { control: self };
        if !self.is_stale() {
            self.surface.set_like_enabled(self.post_id, false);
        }

        debug!(post_id = %self.post_id, "liking post");
        let outcome = match self.service.like_post(self.post_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ClientError::remote("like_post", RemoteFailure::Rejected)),
            Err(err) => Err(err),
        };

        let mut state = self.lock_state();
        let stale = self.is_stale();
        match outcome {
            Ok(()) => {
                state.counter.record_like();
                state.status = LikeStatus::Liked;
                let count = state.counter.displayed();
                info!(post_id = %self.post_id, count, "post liked");
                if !stale {
                    self.surface.set_like_count(self.post_id, count);
                    self.surface.set_liked(self.post_id, true);
                }
                Ok(count)
            }
            Err(err) => {
                warn!(post_id = %self.post_id, error = %err, "like failed");
                state.status = LikeStatus::Idle;
                if !stale {
                    self.surface.set_liked(self.post_id, false);
                    self.surface.set_like_enabled(self.post_id, true);
                    self.surface.notify(Notice::Error(UiError::from_client_error(
                        UiErrorContext::LikePost,
                        &err,
                    )));
                }
                Err(err)
            }
        }
    }
}

/// Returns an abandoned like to `Idle` when its future is dropped mid-call.
struct InFlightGuard<'a> {
    control: &'a LikeControl,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let control = self.control;
        let mut state = control.lock_state();
        if state.status != LikeStatus::InFlight {
            return;
        }
        debug!(post_id = %control.post_id, "like abandoned before completion");
        state.status = LikeStatus::Idle;
        if !control.is_stale() {
            control.surface.set_like_enabled(control.post_id, true);
        }
    }
}

#[cfg(test)]
#[path = "tests/like_tests.rs"]
mod tests;
