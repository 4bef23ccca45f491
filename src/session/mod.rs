//! Session & credential management.
//!
//! Owns the authenticated identity: establishes it at startup (fresh auth or
//! session/OAuth restore), persists the renewable credential when enabled, and
//! exposes the state machine the reconnect supervisor drives.
//!
//! State transitions:
//! ```text
//! UNAUTHENTICATED → AUTHENTICATING → AUTHENTICATED → RECONNECTING
//!                        ↓                               ↓
//!                  UNAUTHENTICATED ←──────────── AUTHENTICATED/FAILED
//! ```

pub mod reconnect;

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::config_store::ConfigStore;
use crate::transport::{AuthRequest, DisplayProfile, LaunchService, Permissions};
use crate::types::{Error, Result, WrapperConfig};

pub use reconnect::ReconnectSupervisor;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Reconnecting,
    /// Terminal; only reachable on the startup path under `stop_on_error`.
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self == SessionState::Failed
    }

    /// Check if transition is valid.
    pub fn can_transition_to(self, to: SessionState) -> bool {
        match (self, to) {
            (SessionState::Unauthenticated, SessionState::Authenticating) => true,
            (SessionState::Unauthenticated, SessionState::Reconnecting) => true,
            (SessionState::Authenticating, SessionState::Authenticated) => true,
            (SessionState::Authenticating, SessionState::Unauthenticated) => true,
            (SessionState::Authenticating, SessionState::Failed) => true,
            (SessionState::Authenticated, SessionState::Reconnecting) => true,
            (SessionState::Authenticated, SessionState::Authenticating) => true,
            (SessionState::Reconnecting, SessionState::Authenticating) => true,
            (SessionState::Reconnecting, SessionState::Authenticated) => true,
            (SessionState::Reconnecting, SessionState::Unauthenticated) => true,
            (SessionState::Reconnecting, SessionState::Failed) => true,
            (SessionState::Failed, _) => false,
            _ => false,
        }
    }
}

struct SessionInner {
    state: SessionState,
    permissions: Permissions,
    display_profile: Option<DisplayProfile>,
}

/// Session & credential manager.
pub struct SessionManager {
    service: Arc<dyn LaunchService>,
    store: Arc<dyn ConfigStore>,
    config: Arc<RwLock<WrapperConfig>>,
    inner: Mutex<SessionInner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        service: Arc<dyn LaunchService>,
        store: Arc<dyn ConfigStore>,
        config: Arc<RwLock<WrapperConfig>>,
    ) -> Self {
        Self {
            service,
            store,
            config,
            inner: Mutex::new(SessionInner {
                state: SessionState::Unauthenticated,
                permissions: Permissions::default(),
                display_profile: None,
            }),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn permissions(&self) -> Permissions {
        self.inner.lock().await.permissions.clone()
    }

    pub async fn display_profile(&self) -> Option<DisplayProfile> {
        self.inner.lock().await.display_profile.clone()
    }

    async fn transition(&self, to: SessionState) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !inner.state.can_transition_to(to) {
            return Err(Error::internal(format!(
                "invalid session transition: {:?} -> {:?}",
                inner.state, to
            )));
        }
        inner.state = to;
        Ok(())
    }

    /// Startup policy: restore when persistence is enabled and a credential is
    /// saved (falling back to fresh auth), otherwise fresh auth.
    ///
    /// With `save_session` disabled this never touches `restore()` and never
    /// writes a token.
    pub async fn establish(&self) -> Result<()> {
        let (save_session, has_saved) = {
            let cfg = self.config.read().await;
            (cfg.save_session, cfg.saved.is_some())
        };

        if save_session && has_saved {
            match self.restore().await {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::warn!("{}; falling back to password authentication", e);
                    self.authenticate().await
                }
            }
        } else {
            self.authenticate().await
        }
    }

    /// Fresh authentication with the stored password credential.
    ///
    /// On success, persists the renewable credential form (when enabled)
    /// before publishing the authenticated state.
    pub async fn authenticate(&self) -> Result<()> {
        let (request, save_session) = {
            let cfg = self.config.read().await;
            (
                AuthRequest {
                    login: cfg.login.clone(),
                    password: cfg.password.clone(),
                    auth_scope_id: cfg.auth_scope_id.clone(),
                },
                cfg.save_session,
            )
        };

        self.transition(SessionState::Authenticating).await?;
        tracing::debug!("authenticating as {:?} (password credential)", request.login);

        let response = match self.service.authenticate(request).await {
            Ok(response) => response,
            Err(e) => {
                let mut inner = self.inner.lock().await;
                inner.state = SessionState::Unauthenticated;
                let error = match e {
                    Error::Auth(_) => e,
                    other => Error::auth(other.to_string()),
                };
                tracing::warn!("{}", error);
                return Err(error);
            }
        };

        if save_session {
            // Full-file replace; the config on disk always carries exactly one
            // credential form after this point.
            let mut cfg = self.config.write().await;
            cfg.saved = response.credential.to_saved();
            self.store.save(&cfg).await?;
            tracing::debug!("persisted {} credential", cfg.saved.form_label());
        }

        let mut inner = self.inner.lock().await;
        inner.permissions = response.permissions;
        inner.display_profile = response.display_profile;
        inner.state = SessionState::Authenticated;
        tracing::info!(
            "authenticated ({} roles, identity {})",
            inner.permissions.roles.len(),
            inner
                .display_profile
                .as_ref()
                .map_or("unknown", |p| p.username.as_str())
        );
        Ok(())
    }

    /// Resume the persisted session without re-submitting a password.
    pub async fn restore(&self) -> Result<()> {
        let saved = {
            let cfg = self.config.read().await;
            if !cfg.save_session {
                return Err(Error::restore("session persistence is disabled"));
            }
            cfg.saved.clone()
        };
        if !saved.is_some() {
            return Err(Error::restore("no persisted credential"));
        }

        self.transition(SessionState::Authenticating).await?;
        tracing::debug!("restoring session ({} credential)", saved.form_label());

        match self.service.restore(&saved).await {
            Ok(()) => {
                let mut inner = self.inner.lock().await;
                inner.state = SessionState::Authenticated;
                tracing::info!("session restored ({} credential)", saved.form_label());
                Ok(())
            }
            Err(e) => {
                let mut inner = self.inner.lock().await;
                inner.state = SessionState::Unauthenticated;
                Err(match e {
                    Error::Restore(_) => e,
                    other => Error::restore(format!(
                        "{} credential rejected: {}",
                        saved.form_label(),
                        other
                    )),
                })
            }
        }
    }

    /// Enter the reconnect cycle after a transport disconnect.
    pub async fn begin_reconnect(&self) {
        let mut inner = self.inner.lock().await;
        if inner.state.can_transition_to(SessionState::Reconnecting) {
            inner.state = SessionState::Reconnecting;
        }
    }

    /// Terminal failure; startup path only, under `stop_on_error`.
    pub async fn mark_failed(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = SessionState::Failed;
    }
}
