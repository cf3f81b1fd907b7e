//! Session lifecycle: restore, login, logout, and the per-session context handed to controllers.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use shared::domain::Principal;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::ClientError,
    identity::{Identity, IdentityProvider, LoginOptions},
    service::{PostService, ServiceClientFactory},
    surface::{Navigator, Route},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated(Identity),
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SessionState::Authenticated(identity) => Some(identity.principal()),
            _ => None,
        }
    }
}

/// Identity and the one service client bound to it.
pub struct SessionContext {
    identity: Identity,
    client: Arc<dyn PostService>,
    cancel: CancellationToken,
}

impl SessionContext {
    pub fn new(identity: Identity, client: Arc<dyn PostService>, cancel: CancellationToken) -> Self {
        Self {
            identity,
            client,
            cancel,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn client(&self) -> Arc<dyn PostService> {
        Arc::clone(&self.client)
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

pub struct SessionManager {
    provider: Arc<dyn IdentityProvider>,
    navigator: Arc<dyn Navigator>,
    state: StdMutex<SessionState>,
    context: Mutex<Option<Arc<SessionContext>>>,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            provider,
            navigator,
            state: StdMutex::new(SessionState::Unauthenticated),
            context: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub async fn identity(&self) -> Option<Identity> {
        match &*self.lock_state() {
            SessionState::Authenticated(identity) => Some(identity.clone()),
            _ => None,
        }
    }

    /// Picks up a session the provider still holds. `None` is the ordinary signed-out outcome.
    pub async fn restore(&self) -> Option<Identity> {
        let identity = if self.provider.is_authenticated().await {
            self.provider
                .identity()
                .await
                .filter(|identity| identity.is_valid())
        } else {
            None
        };

        match identity {
            Some(identity) => {
                info!(principal = %identity.principal(), "restored authenticated session");
                *self.lock_state() = SessionState::Authenticated(identity.clone());
                Some(identity)
            }
            None => {
                *self.lock_state() = SessionState::Unauthenticated;
                self.close_context().await;
                None
            }
        }
    }

    pub async fn login(&self, provider_url: &str) -> Result<Identity, ClientError> {
        {
            let mut state = self.lock_state();
            match &*state {
                SessionState::Unauthenticated => {}
                SessionState::Authenticating => {
                    return Err(ClientError::Auth("a login is already in progress".into()))
                }
                SessionState::Authenticated(identity) => {
                    return Err(ClientError::Auth(format!(
                        "already signed in as {}",
                        identity.principal()
                    )))
                }
            }
            *state = SessionState::Authenticating;
        }
        let _pending = LoginGuard { session: self };

        info!(provider_url, "starting login");
        let outcome = self
            .provider
            .login(&LoginOptions::new(provider_url))
            .await
            .and_then(|identity| {
                if identity.is_valid() {
                    Ok(identity)
                } else {
                    Err(ClientError::Auth("provider returned an expired identity".into()))
                }
            });

        let mut state = self.lock_state();
        match outcome {
            Ok(identity) => {
                info!(principal = %identity.principal(), "login succeeded");
                *state = SessionState::Authenticated(identity.clone());
                drop(state);
                self.navigator.redirect(Route::Feed);
                Ok(identity)
            }
            Err(err) => {
                error!(error = %err, "login failed");
                *state = SessionState::Unauthenticated;
                Err(err.into_auth())
            }
        }
    }

    /// Tears down local state even if the provider fails to forget the session.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let outcome = self.provider.logout().await;

        self.close_context().await;
        *self.lock_state() = SessionState::Unauthenticated;
        self.navigator.redirect(Route::Landing);

        match outcome {
            Ok(()) => {
                info!("logged out");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "identity provider logout failed");
                Err(err.into_auth())
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn close_context(&self) {
        if let Some(context) = self.context.lock().await.take() {
            context.close();
        }
    }

    /// Returns the session's context, building its service client on first use.
    pub async fn open_context(
        &self,
        factory: &ServiceClientFactory,
    ) -> Result<Arc<SessionContext>, ClientError> {
        let identity = self.identity().await.ok_or_else(|| {
            ClientError::Configuration("cannot build a service client without an identity".into())
        })?;

        let mut slot = self.context.lock().await;
        if let Some(context) = slot.as_ref() {
            if context.identity() == &identity && !context.is_closed() {
                return Ok(Arc::clone(context));
            }
            context.close();
        }

        let cancel = CancellationToken::new();
        let client = factory
            .build_with_cancel(Some(&identity), cancel.clone())
            .await?;
        let context = Arc::new(SessionContext::new(identity, client.into_shared(), cancel));
        *slot = Some(Arc::clone(&context));
        Ok(context)
    }

    /// Restore for an authenticated-only view: sends the user to the landing page
    /// without touching the service when no session exists.
    pub async fn enter_feed(
        &self,
        factory: &ServiceClientFactory,
    ) -> Result<Option<Arc<SessionContext>>, ClientError> {
        if self.restore().await.is_none() {
            info!("no authenticated session; redirecting to landing");
            self.navigator.redirect(Route::Landing);
            return Ok(None);
        }
        self.open_context(factory).await.map(Some)
    }
}

/// Reverts an unfinished login to `Unauthenticated`, e.g. when the caller drops the future.
struct LoginGuard<'a> {
    session: &'a SessionManager,
}

impl Drop for LoginGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.session.lock_state();
        if *state == SessionState::Authenticating {
            warn!("login abandoned before the provider answered");
            *state = SessionState::Unauthenticated;
        }
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
