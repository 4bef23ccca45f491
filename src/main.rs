//! hostwrap binary - main entry point.
//!
//! Loads (or creates) the wrapper config, connects the launch service client,
//! runs the startup sequence, and hands control to the configured entry
//! point. A fatal startup failure under `stop_on_error` exits with a status
//! distinct per cause (see `Error::exit_code`).

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use hostwrap::config_store::{ConfigStore, JsonConfigStore};
use hostwrap::launch::{CommandEntryPoint, PathEnvironmentPreparer, ProcessLauncher};
use hostwrap::modules::{ModuleLoader, StaticTrustVerifier, TrustPolicy};
use hostwrap::transport::TcpLaunchService;
use hostwrap::Supervisor;

#[derive(Parser, Debug)]
#[command(name = "hostwrap", version, about = "Supervisor wrapper for an embedded server")]
struct Cli {
    /// Wrapper config file; created with defaults on first run.
    #[arg(long, default_value = "hostwrap.json", env = "HOSTWRAP_CONFIG")]
    config: PathBuf,

    /// Entry point and its arguments, used when the config leaves them unset.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    hostwrap::observability::init_tracing();

    if let Err(e) = run(cli).await {
        tracing::error!("startup failed: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> hostwrap::Result<()> {
    let store = Arc::new(JsonConfigStore::new(&cli.config));
    let config = store.load_or_default().await?;
    tracing::info!(
        "hostwrap starting: project {}, launch service {}",
        config.project_name,
        config.address
    );

    // Dials lazily so connection failures hit the stop_on_error policy
    // instead of aborting construction.
    let service = TcpLaunchService::new(config.address.clone());

    // The binary admits no modules itself; embedders register theirs through
    // the library API before `run`.
    let loader = ModuleLoader::new(
        TrustPolicy::RejectUnsigned,
        Box::new(StaticTrustVerifier::default()),
    );

    let launcher = ProcessLauncher::new(
        Box::new(CommandEntryPoint::new()),
        Box::new(PathEnvironmentPreparer),
    );

    let supervisor = Supervisor::new(config, store, service, loader, launcher);
    supervisor.run(cli.args).await
}
