//! Process launcher - entry-point dispatch.
//!
//! The last action of the startup sequence: resolve the externally supplied
//! entry point and invoke it blocking, handing the prepared argument list and
//! environment over. Resolution is a capability interface so tests (and
//! embedders with their own dispatch) can substitute a fake entry point.

use std::path::{Path, PathBuf};

use crate::types::{Error, Result, WrapperConfig};

/// Argument/environment staging area exposed to wrapper-phase modules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchStaging {
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl LaunchStaging {
    pub fn new(args: Vec<String>) -> Self {
        Self {
            args,
            env: Vec::new(),
        }
    }
}

/// A resolved entry point, ready for a blocking invocation.
pub trait Invokable: Send {
    /// Invoke with the finalized arguments and environment additions.
    ///
    /// Blocks until the external logic returns; control is expected to stay
    /// there indefinitely.
    fn call(self: Box<Self>, args: &[String], env: &[(String, String)]) -> Result<()>;
}

/// Resolves an entry point symbol by name.
pub trait EntryPointResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Box<dyn Invokable>>;
}

/// Classpath/library augmentation requested from the environment preparer.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentRequest {
    pub search_path: Vec<PathBuf>,
    pub libraries_dir: Option<PathBuf>,
}

/// Builds an isolated execution environment capable of resolving entry points.
pub trait EnvironmentPreparer: Send + Sync {
    fn prepare(&self, request: &EnvironmentRequest) -> Result<Box<dyn EntryPointResolver>>;
}

/// Entry-point dispatch for the startup sequence.
pub struct ProcessLauncher {
    default_resolver: Box<dyn EntryPointResolver>,
    preparer: Box<dyn EnvironmentPreparer>,
}

impl std::fmt::Debug for ProcessLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessLauncher").finish_non_exhaustive()
    }
}

impl ProcessLauncher {
    pub fn new(
        default_resolver: Box<dyn EntryPointResolver>,
        preparer: Box<dyn EnvironmentPreparer>,
    ) -> Self {
        Self {
            default_resolver,
            preparer,
        }
    }

    /// Resolve the entry point name and base arguments.
    ///
    /// The configured entry point wins; an empty one falls back to the first
    /// inherited argument. Explicit configured arguments take precedence over
    /// inherited ones.
    pub fn stage(config: &WrapperConfig, inherited: &[String]) -> Result<(String, LaunchStaging)> {
        let (entry, consumed_first) = if config.entry_point.is_empty() {
            match inherited.first() {
                Some(first) => (first.clone(), true),
                None => {
                    return Err(Error::configuration(
                        "no entry point: set entry_point in the config or pass it as the first argument",
                    ));
                }
            }
        } else {
            (config.entry_point.clone(), false)
        };

        let args = match &config.args {
            Some(configured) => configured.clone(),
            None if consumed_first => inherited[1..].to_vec(),
            None => inherited.to_vec(),
        };

        Ok((entry, LaunchStaging::new(args)))
    }

    /// Resolve and invoke the entry point. Blocking; does not return until the
    /// external logic does.
    pub fn launch(
        &self,
        config: &WrapperConfig,
        entry_name: &str,
        staging: &LaunchStaging,
    ) -> Result<()> {
        if config.autoload_libraries && config.libraries_dir.is_none() {
            return Err(Error::configuration(
                "autoload_libraries enabled but libraries_dir is not set",
            ));
        }

        let prepared: Option<Box<dyn EntryPointResolver>>;
        let resolver: &dyn EntryPointResolver = if config.custom_search_path {
            if config.search_path.is_empty() {
                return Err(Error::configuration(
                    "custom_search_path enabled but search_path is empty",
                ));
            }
            let request = EnvironmentRequest {
                search_path: config.search_path.clone(),
                libraries_dir: config
                    .autoload_libraries
                    .then(|| config.libraries_dir.clone())
                    .flatten(),
            };
            prepared = Some(self.preparer.prepare(&request)?);
            prepared.as_deref().unwrap_or(self.default_resolver.as_ref())
        } else if config.autoload_libraries {
            let request = EnvironmentRequest {
                search_path: Vec::new(),
                libraries_dir: config.libraries_dir.clone(),
            };
            prepared = Some(self.preparer.prepare(&request)?);
            prepared.as_deref().unwrap_or(self.default_resolver.as_ref())
        } else {
            self.default_resolver.as_ref()
        };

        let invokable = resolver.resolve(entry_name)?;
        tracing::info!("invoking entry point {} with {} args", entry_name, staging.args.len());
        invokable.call(&staging.args, &staging.env)
    }
}

// =============================================================================
// Default implementation: external executable dispatch
// =============================================================================

/// Default resolver: locates an executable by name on a search path (falling
/// back to `PATH`) and invokes it as a child process, waiting for it.
#[derive(Debug, Clone, Default)]
pub struct CommandEntryPoint {
    search_path: Vec<PathBuf>,
    env: Vec<(String, String)>,
}

impl CommandEntryPoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(search_path: Vec<PathBuf>, env: Vec<(String, String)>) -> Self {
        Self { search_path, env }
    }
}

impl EntryPointResolver for CommandEntryPoint {
    fn resolve(&self, name: &str) -> Result<Box<dyn Invokable>> {
        let program = locate_executable(name, &self.search_path).ok_or_else(|| {
            Error::entry_point(format!("executable not found: {}", name))
        })?;
        Ok(Box::new(CommandInvokable {
            program,
            env: self.env.clone(),
        }))
    }
}

/// Locate `name` either as an explicit path or by searching the given
/// directories, then the process `PATH`.
fn locate_executable(name: &str, search_path: &[PathBuf]) -> Option<PathBuf> {
    let as_path = Path::new(name);
    if as_path.components().count() > 1 {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }

    let env_path = std::env::var_os("PATH").unwrap_or_default();
    let env_dirs: Vec<PathBuf> = std::env::split_paths(&env_path).collect();
    search_path
        .iter()
        .chain(env_dirs.iter())
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[derive(Debug)]
struct CommandInvokable {
    program: PathBuf,
    env: Vec<(String, String)>,
}

impl Invokable for CommandInvokable {
    fn call(self: Box<Self>, args: &[String], env: &[(String, String)]) -> Result<()> {
        let mut command = std::process::Command::new(&self.program);
        command.args(args);
        for (key, value) in self.env.iter().chain(env.iter()) {
            command.env(key, value);
        }
        let status = command.status()?;
        // The child's own status belongs to the external logic.
        tracing::info!("entry point {} exited: {}", self.program.display(), status);
        Ok(())
    }
}

/// Default preparer: maps library augmentation onto the child's
/// `LD_LIBRARY_PATH` and hands the search path to [`CommandEntryPoint`].
#[derive(Debug, Clone, Default)]
pub struct PathEnvironmentPreparer;

impl EnvironmentPreparer for PathEnvironmentPreparer {
    fn prepare(&self, request: &EnvironmentRequest) -> Result<Box<dyn EntryPointResolver>> {
        let mut env = Vec::new();
        if let Some(dir) = &request.libraries_dir {
            if !dir.is_dir() {
                return Err(Error::configuration(format!(
                    "libraries_dir does not exist: {}",
                    dir.display()
                )));
            }
            let mut value = dir.display().to_string();
            if let Ok(existing) = std::env::var("LD_LIBRARY_PATH") {
                if !existing.is_empty() {
                    value = format!("{}:{}", value, existing);
                }
            }
            env.push(("LD_LIBRARY_PATH".to_string(), value));
        }
        Ok(Box::new(CommandEntryPoint::with_environment(
            request.search_path.clone(),
            env,
        )))
    }
}
