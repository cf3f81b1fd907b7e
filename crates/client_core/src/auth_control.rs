//! Landing-page login/logout toggle.

use std::sync::Arc;

use crate::{
    error::ClientError,
    session::{SessionManager, SessionState},
    surface::{AuthSurface, Notice, UiError, UiErrorContext},
};

pub struct AuthControl {
    session: Arc<SessionManager>,
    surface: Arc<dyn AuthSurface>,
}

impl AuthControl {
    pub fn new(session: Arc<SessionManager>, surface: Arc<dyn AuthSurface>) -> Self {
        Self { session, surface }
    }

    pub fn label(state: &SessionState) -> &'static str {
        if state.is_authenticated() {
            "Logout"
        } else {
            "Login"
        }
    }

    pub async fn render(&self) {
        match self.session.state().await {
            SessionState::Authenticated(identity) => {
                self.surface.show_signed_in(identity.principal())
            }
            _ => self.surface.show_signed_out(),
        }
    }

    pub async fn toggle(&self, provider_url: &str) -> Result<(), ClientError> {
        let (context, outcome) = if self.session.state().await.is_authenticated() {
            (UiErrorContext::Logout, self.session.logout().await)
        } else {
            (
                UiErrorContext::Login,
                self.session.login(provider_url).await.map(|_| ()),
            )
        };

        self.render().await;
        if let Err(err) = &outcome {
            self.surface
                .notify(Notice::Error(UiError::from_client_error(context, err)));
        }
        outcome
    }
}

#[cfg(test)]
#[path = "tests/auth_control_tests.rs"]
mod tests;
