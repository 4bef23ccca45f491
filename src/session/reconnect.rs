//! Reconnect supervisor.
//!
//! Sole handler for transport "connection closed" notifications. Runs on its
//! own task so rapid disconnects queue in the channel instead of blocking the
//! transport; one cycle is fully handled (restore/auth + profile rebind)
//! before the next notification is taken, so cycles never overlap.
//!
//! Reconnect failures are always recovered locally: the session is left
//! degraded and logged, the process keeps running. `stop_on_error` applies to
//! the startup path only.

use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use super::SessionManager;
use crate::profiles::ProfileResolver;
use crate::transport::DisconnectNotice;
use crate::types::{Result, WrapperConfig};

/// Background responder to disconnect notifications.
pub struct ReconnectSupervisor {
    session: Arc<SessionManager>,
    profiles: Arc<ProfileResolver>,
    config: Arc<RwLock<WrapperConfig>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ReconnectSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectSupervisor").finish_non_exhaustive()
    }
}

impl ReconnectSupervisor {
    pub fn new(
        session: Arc<SessionManager>,
        profiles: Arc<ProfileResolver>,
        config: Arc<RwLock<WrapperConfig>>,
    ) -> Self {
        Self {
            session,
            profiles,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token for stopping the supervisor task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Consume the disconnect channel until it closes or the token fires.
    pub fn spawn(self, mut notices: mpsc::Receiver<DisconnectNotice>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        tracing::debug!("reconnect supervisor stopping");
                        break;
                    }
                    notice = notices.recv() => match notice {
                        Some(notice) => self.handle_disconnect(notice).await,
                        None => {
                            tracing::debug!("disconnect channel closed");
                            break;
                        }
                    }
                }
            }
        })
    }

    /// One full reconnect cycle for one notification.
    async fn handle_disconnect(&self, notice: DisconnectNotice) {
        tracing::warn!("transport closed ({}); re-establishing session", notice.reason);
        self.session.begin_reconnect().await;

        let (budget, pause) = {
            let cfg = self.config.read().await;
            (cfg.reconnect_count.max(1), cfg.reconnect_sleep)
        };

        for attempt in 1..=budget {
            match self.attempt().await {
                Ok(()) => {
                    // Rebind before signalling: the remote catalogue may have
                    // changed between connections.
                    match self.profiles.refresh().await {
                        Ok(selection) => tracing::info!(
                            "reconnected (profile {})",
                            selection.label()
                        ),
                        Err(e) => tracing::warn!("reconnected, but profile rebind failed: {}", e),
                    }
                    return;
                }
                Err(e) => {
                    tracing::warn!("reconnect attempt {}/{} failed: {}", attempt, budget, e);
                    if attempt < budget {
                        tokio::select! {
                            _ = self.cancel.cancelled() => return,
                            _ = tokio::time::sleep(pause) => {}
                        }
                    }
                }
            }
        }

        tracing::error!(
            "reconnect budget of {} exhausted; session left degraded until the next disconnect",
            budget
        );
    }

    /// Restore when persistence holds a credential, otherwise (or on restore
    /// failure) fresh authentication.
    async fn attempt(&self) -> Result<()> {
        let (save_session, has_saved) = {
            let cfg = self.config.read().await;
            (cfg.save_session, cfg.saved.is_some())
        };

        if save_session && has_saved {
            match self.session.restore().await {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::warn!("{}; trying fresh authentication", e);
                    self.session.authenticate().await
                }
            }
        } else {
            self.session.authenticate().await
        }
    }
}
