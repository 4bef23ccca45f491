//! Launch service boundary.
//!
//! The supervisor core talks to the remote launch service through the
//! [`LaunchService`] trait: request/response calls for authenticate, restore
//! and profile-fetch, plus a single handoff point for "connection closed"
//! notifications. The service itself is an external collaborator; `tcp`
//! carries the reference client implementation.

pub mod codec;
#[cfg(test)]
pub mod fake;
pub mod tcp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::profiles::Profile;
use crate::types::{Result, SavedCredential};

pub use tcp::TcpLaunchService;

/// Password credential submitted for a fresh authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub login: String,
    pub password: String,
    pub auth_scope_id: String,
}

/// Identity permissions granted by the launch service.
///
/// Empty permissions are the degraded state the supervisor continues in when
/// authentication fails and `stop_on_error` is off.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl Permissions {
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty() && self.flags.is_empty()
    }
}

/// Display profile attached to the authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayProfile {
    pub id: Uuid,
    pub username: String,
}

/// Renewable credential issued by a successful authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssuedCredential {
    RawSession {
        token: Uuid,
    },
    OAuth {
        access_token: String,
        refresh_token: String,
        expires_at: DateTime<Utc>,
    },
}

impl IssuedCredential {
    /// Convert to the persisted form.
    pub fn to_saved(&self) -> SavedCredential {
        match self {
            IssuedCredential::RawSession { token } => {
                SavedCredential::RawSession { token: *token }
            }
            IssuedCredential::OAuth {
                access_token,
                refresh_token,
                expires_at,
            } => SavedCredential::OAuth {
                access_token: access_token.clone(),
                refresh_token: refresh_token.clone(),
                expires_at: *expires_at,
            },
        }
    }
}

/// Successful authentication result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub permissions: Permissions,
    pub display_profile: Option<DisplayProfile>,
    pub credential: IssuedCredential,
}

/// Transport-level "connection closed" notification.
#[derive(Debug, Clone)]
pub struct DisconnectNotice {
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Request/response boundary to the remote launch service.
#[async_trait]
pub trait LaunchService: Send + Sync {
    /// Submit a password credential.
    async fn authenticate(&self, request: AuthRequest) -> Result<AuthResponse>;

    /// Resume a previously issued session without re-submitting a password.
    async fn restore(&self, credential: &SavedCredential) -> Result<()>;

    /// Fetch the remote profile catalogue, in remote-supplied order.
    async fn fetch_profiles(&self) -> Result<Vec<Profile>>;

    /// Hand over the disconnect notification receiver.
    ///
    /// There is exactly one receiver: the first caller becomes the sole
    /// handler and later calls return `None`.
    fn take_disconnects(&self) -> Option<mpsc::Receiver<DisconnectNotice>>;
}
