//! Configuration structures.
//!
//! The wrapper config is a persisted record: created defaulted on first run,
//! rewritten whenever a renewable credential is issued, never deleted
//! automatically. Persistence itself lives in `config_store`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Persisted credential material.
///
/// Exactly one renewable form is held at a time; simultaneous presence of an
/// OAuth pair and a raw session token is unrepresentable. At restore time the
/// precedence question (OAuth over raw session) is therefore already decided
/// by whichever form the last successful authentication wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SavedCredential {
    /// No persisted session material.
    #[default]
    None,
    /// Raw session token issued by the launch service.
    RawSession { token: Uuid },
    /// OAuth token pair with its expiry instant.
    OAuth {
        access_token: String,
        refresh_token: String,
        expires_at: DateTime<Utc>,
    },
}

impl SavedCredential {
    /// Check whether any session material is persisted.
    pub fn is_some(&self) -> bool {
        !matches!(self, SavedCredential::None)
    }

    /// Short label for log lines ("which credential form attempted").
    pub fn form_label(&self) -> &'static str {
        match self {
            SavedCredential::None => "none",
            SavedCredential::RawSession { .. } => "raw-session",
            SavedCredential::OAuth { .. } => "oauth",
        }
    }
}

/// Wrapper configuration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapperConfig {
    /// Project name, used only for startup banners.
    pub project_name: String,

    /// Launch service address (host:port).
    pub address: String,

    /// Server binding name matched against the remote profile catalogue.
    pub server_name: String,

    /// Login for password authentication.
    pub login: String,

    /// Password for password authentication.
    pub password: String,

    /// Auth scope identifier sent with the password credential.
    pub auth_scope_id: String,

    /// Persist the renewable credential after successful authentication and
    /// prefer restoring it over re-submitting the password.
    pub save_session: bool,

    /// Escalate startup failures to process termination.
    pub stop_on_error: bool,

    /// Reconnect attempt budget per disconnect notification.
    pub reconnect_count: u32,

    /// Sleep between failed reconnect attempts.
    #[serde(with = "humantime_serde")]
    pub reconnect_sleep: Duration,

    /// Entry point name; empty means "take the first command-line argument".
    pub entry_point: String,

    /// Explicit entry point arguments. When set, these take precedence over
    /// arguments inherited from the wrapper's own command line.
    pub args: Option<Vec<String>>,

    /// Resolve the entry point through an isolated search path instead of the
    /// default execution environment.
    pub custom_search_path: bool,

    /// Directories searched for the entry point when `custom_search_path` is
    /// enabled.
    pub search_path: Vec<PathBuf>,

    /// Augment the child library path from `libraries_dir`.
    pub autoload_libraries: bool,

    /// Library directory used when `autoload_libraries` is enabled.
    pub libraries_dir: Option<PathBuf>,

    /// Persisted session material (written only when `save_session` is set).
    pub saved: SavedCredential,
}

impl Default for WrapperConfig {
    fn default() -> Self {
        Self {
            project_name: "hostwrap".to_string(),
            address: "127.0.0.1:9274".to_string(),
            server_name: "your server name".to_string(),
            login: "login".to_string(),
            password: "password".to_string(),
            auth_scope_id: String::new(),
            save_session: true,
            stop_on_error: true,
            reconnect_count: 10,
            reconnect_sleep: Duration::from_secs(1),
            entry_point: String::new(),
            args: None,
            custom_search_path: false,
            search_path: Vec::new(),
            autoload_libraries: false,
            libraries_dir: None,
            saved: SavedCredential::None,
        }
    }
}
