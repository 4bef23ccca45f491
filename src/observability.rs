//! Observability utilities.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Default filter directives. The wrapper shares stdout with the launched
/// server, so dependencies stay at `warn` and only this crate logs at `info`.
const DEFAULT_DIRECTIVES: &str = "warn,hostwrap=info";

/// Initialize tracing subscriber once for the process.
///
/// `RUST_LOG` overrides the default directives. Output is compact plain text
/// without targets; `HOSTWRAP_LOG_FORMAT=json` switches to JSON lines for log
/// shippers.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
        let json = std::env::var("HOSTWRAP_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let result = if json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().compact().with_target(false))
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}
