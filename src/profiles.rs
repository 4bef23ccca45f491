//! Profile resolution.
//!
//! Matches the locally configured server name against the remote-supplied
//! profile catalogue. Selection is first-match in remote order over
//! (profile, binding) pairs and short-circuits; an empty selection is a
//! degraded state, not an error.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::transport::LaunchService;
use crate::types::{Error, Result, WrapperConfig};

/// A named connection target inside a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerBinding {
    #[serde(default)]
    pub name: String,
    pub address: Option<String>,
    pub port: Option<u16>,
}

/// Remotely defined configuration bundle.
///
/// Bindings arrive as `Option` because remote catalogues have been observed
/// with null holes; resolution skips them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub servers: Vec<Option<ServerBinding>>,
}

/// The selected (profile, binding) pair, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSelection {
    selected: Option<(Profile, ServerBinding)>,
}

impl ProfileSelection {
    pub fn is_bound(&self) -> bool {
        self.selected.is_some()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.selected.as_ref().map(|(p, _)| p)
    }

    pub fn binding(&self) -> Option<&ServerBinding> {
        self.selected.as_ref().map(|(_, b)| b)
    }

    /// Profile name for banners; "unknown" in the unbound state.
    pub fn label(&self) -> &str {
        self.profile().map_or("unknown", |p| p.name.as_str())
    }
}

/// First binding whose name equals `server_name`, in remote-supplied order.
///
/// Null or nameless binding entries are skipped. Iteration stops at the first
/// match; later profiles carrying the same binding name are never considered.
pub fn select_binding(profiles: &[Profile], server_name: &str) -> ProfileSelection {
    for profile in profiles {
        for binding in profile.servers.iter().flatten() {
            if binding.name.is_empty() {
                continue;
            }
            if binding.name == server_name {
                tracing::debug!("found profile: {} (binding {})", profile.name, binding.name);
                return ProfileSelection {
                    selected: Some((profile.clone(), binding.clone())),
                };
            }
        }
    }
    ProfileSelection::default()
}

/// Fetches the profile catalogue and keeps the current selection snapshot.
pub struct ProfileResolver {
    service: Arc<dyn LaunchService>,
    config: Arc<RwLock<WrapperConfig>>,
    selection: Mutex<ProfileSelection>,
}

impl std::fmt::Debug for ProfileResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileResolver").finish_non_exhaustive()
    }
}

impl ProfileResolver {
    pub fn new(service: Arc<dyn LaunchService>, config: Arc<RwLock<WrapperConfig>>) -> Self {
        Self {
            service,
            config,
            selection: Mutex::new(ProfileSelection::default()),
        }
    }

    /// Fetch the catalogue and rebind the selection.
    ///
    /// An unmatched server name leaves the selection empty and logs a warning;
    /// only a fetch-level failure is an error.
    pub async fn refresh(&self) -> Result<ProfileSelection> {
        let profiles = self
            .service
            .fetch_profiles()
            .await
            .map_err(|e| Error::profile_fetch(e.to_string()))?;

        let server_name = self.config.read().await.server_name.clone();
        let selection = select_binding(&profiles, &server_name);
        if !selection.is_bound() {
            tracing::warn!(
                "no profile binds server name {:?}; continuing unbound (is server_name correct?)",
                server_name
            );
        }

        let mut current = self.selection.lock().await;
        *current = selection.clone();
        Ok(selection)
    }

    /// Snapshot of the current selection.
    pub async fn selection(&self) -> ProfileSelection {
        self.selection.lock().await.clone()
    }
}
