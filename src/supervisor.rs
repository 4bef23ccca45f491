//! Startup supervisor.
//!
//! One explicitly constructed context object owns the whole wrapper state and
//! drives the sequential startup path: module admission → session
//! establishment → profile resolution → lifecycle events → reconnect
//! supervision → entry-point launch. The process hosts exactly one embedded
//! server, so there is exactly one of these; it is passed around, never
//! ambient.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config_store::ConfigStore;
use crate::launch::ProcessLauncher;
use crate::modules::{LifecycleEvent, ModuleLoader};
use crate::profiles::ProfileResolver;
use crate::session::{ReconnectSupervisor, SessionManager};
use crate::transport::LaunchService;
use crate::types::{Result, WrapperConfig};

/// Wrapper context: configuration, collaborators, and the startup sequence.
pub struct Supervisor {
    config: Arc<RwLock<WrapperConfig>>,
    service: Arc<dyn LaunchService>,
    loader: ModuleLoader,
    session: Arc<SessionManager>,
    profiles: Arc<ProfileResolver>,
    launcher: ProcessLauncher,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("loader", &self.loader)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn new(
        config: WrapperConfig,
        store: Arc<dyn ConfigStore>,
        service: Arc<dyn LaunchService>,
        loader: ModuleLoader,
        launcher: ProcessLauncher,
    ) -> Self {
        let config = Arc::new(RwLock::new(config));
        let session = Arc::new(SessionManager::new(
            service.clone(),
            store,
            config.clone(),
        ));
        let profiles = Arc::new(ProfileResolver::new(service.clone(), config.clone()));
        Self {
            config,
            service,
            loader,
            session,
            profiles,
            launcher,
        }
    }

    /// Module registry, for embedders admitting modules before `run`.
    pub fn loader_mut(&mut self) -> &mut ModuleLoader {
        &mut self.loader
    }

    pub fn session(&self) -> Arc<SessionManager> {
        self.session.clone()
    }

    pub fn profiles(&self) -> Arc<ProfileResolver> {
        self.profiles.clone()
    }

    /// Run the startup sequence and hand control to the entry point.
    ///
    /// Returns only when the external entry point returns. Startup failures
    /// are degraded-and-continued unless `stop_on_error` is set; launch-step
    /// failures are always fatal.
    pub async fn run(mut self, inherited_args: Vec<String>) -> Result<()> {
        self.loader.activate_all();
        self.loader.broadcast_lifecycle(LifecycleEvent::PreConfig);

        let stop_on_error = self.config.read().await.stop_on_error;

        if let Err(e) = self.session.establish().await {
            if stop_on_error {
                self.session.mark_failed().await;
                return Err(e);
            }
            tracing::warn!("continuing unauthenticated (stop_on_error disabled): {}", e);
        }

        if let Err(e) = self.profiles.refresh().await {
            if stop_on_error {
                return Err(e);
            }
            tracing::warn!("continuing without profile binding: {}", e);
        }

        self.loader.broadcast_lifecycle(LifecycleEvent::WrapperInit);
        self.loader.broadcast_lifecycle(LifecycleEvent::PostInit);

        // The reconnect supervisor owns the disconnect channel from here on.
        match self.service.take_disconnects() {
            Some(notices) => {
                let reconnect = ReconnectSupervisor::new(
                    self.session.clone(),
                    self.profiles.clone(),
                    self.config.clone(),
                );
                reconnect.spawn(notices);
            }
            None => tracing::warn!(
                "disconnect notifications already claimed; reconnect supervision disabled"
            ),
        }

        let config = self.config.read().await.clone();
        let (entry, mut staging) = ProcessLauncher::stage(&config, &inherited_args)?;
        self.loader.run_wrapper_phase(&mut staging);

        let selection = self.profiles.selection().await;
        tracing::info!(
            "project {}, launch service {}, profile {}",
            config.project_name,
            config.address,
            selection.label()
        );

        // Blocking invocation; the external logic owns the thread from here.
        let launcher = self.launcher;
        tokio::task::spawn_blocking(move || launcher.launch(&config, &entry, &staging))
            .await
            .map_err(|e| crate::types::Error::internal(format!("launch task panicked: {}", e)))?
    }
}
