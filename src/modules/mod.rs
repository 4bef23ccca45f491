//! Trusted module loader.
//!
//! A restricted loader variant: modules are supplied programmatically by the
//! embedder, pass the trust check for the fixed enforcement mode before they
//! enter the set, and receive ordered lifecycle events once activated. Bulk
//! directory scanning and raw-path loading are deliberately unsupported.

pub mod trust;

use std::sync::Arc;

use crate::launch::LaunchStaging;
use crate::types::{Error, Result};

pub use trust::{Admission, StaticTrustVerifier, TrustClassification, TrustPolicy, TrustVerifier};

/// Ordered lifecycle events delivered to activated modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Before configuration is consumed.
    PreConfig,
    /// After session establishment and profile resolution.
    PostInit,
    /// Launcher-specific event, before the wrapper phase runs.
    WrapperInit,
}

impl LifecycleEvent {
    pub fn name(self) -> &'static str {
        match self {
            LifecycleEvent::PreConfig => "pre-config",
            LifecycleEvent::PostInit => "post-init",
            LifecycleEvent::WrapperInit => "wrapper-init",
        }
    }
}

/// Module lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Registered,
    Activated,
    Failed,
}

/// Optional capability: receive lifecycle events.
pub trait LifecycleHook: Send + Sync {
    fn on_lifecycle(&self, event: LifecycleEvent) -> Result<()>;
}

/// Optional capability: mutate the launch staging area (append arguments,
/// adjust environment) before the launcher reads it.
pub trait WrapperPhaseHook: Send + Sync {
    fn wrapper_phase(&self, staging: &mut LaunchStaging) -> Result<()>;
}

/// An extension unit admitted by the loader.
///
/// Capabilities are discovered by presence, not type identity: a module
/// overrides the accessor for each capability it implements.
pub trait WrapperModule: Send + Sync {
    fn name(&self) -> &str;

    fn as_lifecycle(&self) -> Option<&dyn LifecycleHook> {
        None
    }

    fn as_wrapper_phase(&self) -> Option<&dyn WrapperPhaseHook> {
        None
    }
}

/// A recorded per-module handler failure.
#[derive(Debug)]
pub struct ModuleFailure {
    pub module: String,
    pub error: Error,
}

struct ModuleEntry {
    module: Arc<dyn WrapperModule>,
    status: ModuleStatus,
}

/// Trust-gated module registry.
pub struct ModuleLoader {
    policy: TrustPolicy,
    verifier: Box<dyn TrustVerifier>,
    entries: Vec<ModuleEntry>,
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("policy", &self.policy)
            .field("modules", &self.entries.len())
            .finish()
    }
}

impl ModuleLoader {
    pub fn new(policy: TrustPolicy, verifier: Box<dyn TrustVerifier>) -> Self {
        Self {
            policy,
            verifier,
            entries: Vec::new(),
        }
    }

    pub fn policy(&self) -> TrustPolicy {
        self.policy
    }

    /// Run the trust check and add the module to the set.
    ///
    /// Rejection is surfaced to the caller: admitting untrusted code is a
    /// security decision, never a transient fault.
    pub fn register(&mut self, module: Arc<dyn WrapperModule>) -> Result<()> {
        let name = module.name().to_string();
        if self.entries.iter().any(|e| e.module.name() == name) {
            return Err(Error::internal(format!("module already registered: {}", name)));
        }

        let classification = self.verifier.classify(module.as_ref());
        match self.policy.admission(classification) {
            Admission::Reject => {
                return Err(Error::module_trust(format!(
                    "module {} is {:?} under {:?}",
                    name, classification, self.policy
                )));
            }
            Admission::AdmitWithWarning => {
                tracing::warn!("admitting {:?} module {}", classification, name);
            }
            Admission::Admit => {}
        }

        self.entries.push(ModuleEntry {
            module,
            status: ModuleStatus::Registered,
        });
        Ok(())
    }

    /// Activate a registered module. Idempotent no-op if already activated.
    pub fn activate(&mut self, name: &str) -> Result<()> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.module.name() == name)
            .ok_or_else(|| Error::internal(format!("module not registered: {}", name)))?;

        match entry.status {
            ModuleStatus::Activated => Ok(()),
            ModuleStatus::Failed => Err(Error::internal(format!(
                "module {} previously failed, cannot activate",
                name
            ))),
            ModuleStatus::Registered => {
                entry.status = ModuleStatus::Activated;
                Ok(())
            }
        }
    }

    /// Activate every registered module, in registration order.
    pub fn activate_all(&mut self) {
        for entry in &mut self.entries {
            if entry.status == ModuleStatus::Registered {
                entry.status = ModuleStatus::Activated;
            }
        }
    }

    pub fn status(&self, name: &str) -> Option<ModuleStatus> {
        self.entries
            .iter()
            .find(|e| e.module.name() == name)
            .map(|e| e.status)
    }

    pub fn activated_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.status == ModuleStatus::Activated)
            .map(|e| e.module.name().to_string())
            .collect()
    }

    /// Deliver a lifecycle event to every activated module that declares the
    /// lifecycle capability, in registration order.
    ///
    /// A failing handler marks that module failed and is recorded; delivery to
    /// the remaining modules continues.
    pub fn broadcast_lifecycle(&mut self, event: LifecycleEvent) -> Vec<ModuleFailure> {
        let mut failures = Vec::new();
        for entry in &mut self.entries {
            if entry.status != ModuleStatus::Activated {
                continue;
            }
            let Some(hook) = entry.module.as_lifecycle() else {
                continue;
            };
            if let Err(error) = hook.on_lifecycle(event) {
                tracing::warn!(
                    "module {} failed {} event: {}",
                    entry.module.name(),
                    event.name(),
                    error
                );
                entry.status = ModuleStatus::Failed;
                failures.push(ModuleFailure {
                    module: entry.module.name().to_string(),
                    error,
                });
            }
        }
        failures
    }

    /// Run the wrapper phase over the launch staging area.
    ///
    /// Runs strictly after trust admission and strictly before the launcher
    /// reads final arguments.
    pub fn run_wrapper_phase(&mut self, staging: &mut LaunchStaging) -> Vec<ModuleFailure> {
        let mut failures = Vec::new();
        for entry in &mut self.entries {
            if entry.status != ModuleStatus::Activated {
                continue;
            }
            let Some(hook) = entry.module.as_wrapper_phase() else {
                continue;
            };
            if let Err(error) = hook.wrapper_phase(staging) {
                tracing::warn!(
                    "module {} failed wrapper phase: {}",
                    entry.module.name(),
                    error
                );
                entry.status = ModuleStatus::Failed;
                failures.push(ModuleFailure {
                    module: entry.module.name().to_string(),
                    error,
                });
            }
        }
        failures
    }

    /// Bulk directory-scan loading is not supported in this restricted
    /// variant; the whole point is to accept only modules supplied
    /// programmatically by a trusted embedder.
    pub fn autoload(&mut self) -> Result<()> {
        Err(Error::unsupported(
            "directory autoload is disabled in the restricted loader",
        ))
    }

    /// Raw-path module loading is not supported in this restricted variant.
    pub fn load_from_path(&mut self, path: &std::path::Path) -> Result<()> {
        Err(Error::unsupported(format!(
            "raw-path module loading is disabled in the restricted loader: {}",
            path.display()
        )))
    }
}
