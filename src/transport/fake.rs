//! In-process fake launch service for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    AuthRequest, AuthResponse, DisconnectNotice, DisplayProfile, IssuedCredential, LaunchService,
    Permissions,
};
use crate::profiles::Profile;
use crate::types::{Error, Result, SavedCredential};

/// Scriptable [`LaunchService`] with call counters.
pub struct FakeLaunchService {
    pub auth_calls: AtomicUsize,
    pub restore_calls: AtomicUsize,
    pub profile_calls: AtomicUsize,
    pub auth_ok: AtomicBool,
    pub restore_ok: AtomicBool,
    pub profiles_ok: AtomicBool,
    issue: StdMutex<IssuedCredential>,
    profiles: StdMutex<Vec<Profile>>,
    disconnect_tx: mpsc::Sender<DisconnectNotice>,
    disconnect_rx: StdMutex<Option<mpsc::Receiver<DisconnectNotice>>>,
}

impl std::fmt::Debug for FakeLaunchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeLaunchService").finish_non_exhaustive()
    }
}

impl FakeLaunchService {
    pub fn new() -> Arc<Self> {
        let (disconnect_tx, disconnect_rx) = mpsc::channel(16);
        Arc::new(Self {
            auth_calls: AtomicUsize::new(0),
            restore_calls: AtomicUsize::new(0),
            profile_calls: AtomicUsize::new(0),
            auth_ok: AtomicBool::new(true),
            restore_ok: AtomicBool::new(true),
            profiles_ok: AtomicBool::new(true),
            issue: StdMutex::new(IssuedCredential::RawSession {
                token: Uuid::new_v4(),
            }),
            profiles: StdMutex::new(Vec::new()),
            disconnect_tx,
            disconnect_rx: StdMutex::new(Some(disconnect_rx)),
        })
    }

    pub fn set_issue(&self, credential: IssuedCredential) {
        *self.issue.lock().unwrap() = credential;
    }

    pub fn set_profiles(&self, profiles: Vec<Profile>) {
        *self.profiles.lock().unwrap() = profiles;
    }

    /// Simulate a transport-level disconnect notification.
    pub async fn push_disconnect(&self, reason: &str) {
        let _ = self
            .disconnect_tx
            .send(DisconnectNotice {
                reason: reason.to_string(),
                at: chrono::Utc::now(),
            })
            .await;
    }
}

#[async_trait::async_trait]
impl LaunchService for FakeLaunchService {
    async fn authenticate(&self, _request: AuthRequest) -> Result<AuthResponse> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if !self.auth_ok.load(Ordering::SeqCst) {
            return Err(Error::auth("credential rejected"));
        }
        Ok(AuthResponse {
            permissions: Permissions {
                roles: vec!["server".to_string()],
                flags: Vec::new(),
            },
            display_profile: Some(DisplayProfile {
                id: Uuid::new_v4(),
                username: "wrapper".to_string(),
            }),
            credential: self.issue.lock().unwrap().clone(),
        })
    }

    async fn restore(&self, _credential: &SavedCredential) -> Result<()> {
        self.restore_calls.fetch_add(1, Ordering::SeqCst);
        if self.restore_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::restore("token expired"))
        }
    }

    async fn fetch_profiles(&self) -> Result<Vec<Profile>> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        if !self.profiles_ok.load(Ordering::SeqCst) {
            return Err(Error::profile_fetch("catalogue unavailable"));
        }
        Ok(self.profiles.lock().unwrap().clone())
    }

    fn take_disconnects(&self) -> Option<mpsc::Receiver<DisconnectNotice>> {
        self.disconnect_rx.lock().unwrap().take()
    }
}
