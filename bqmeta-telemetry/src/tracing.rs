use std::sync::Once;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable that enables log output in tests when set.
const TEST_LOG_ENV_NAME: &str = "ENABLE_TRACING";

/// Crate whose events are always shown.
const LIBRARY_TARGET: &str = "bqmeta";

static TEST_TRACING: Once = Once::new();

/// Installs the global subscriber for a binary.
///
/// `RUST_LOG` takes precedence; otherwise the binary and the `bqmeta` crate log at `info`.
pub fn init_tracing(app_name: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(app_name)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
}

/// Installs a test subscriber once per process.
///
/// Output is only produced when `ENABLE_TRACING` is set, so test runs stay quiet by default.
pub fn init_test_tracing() {
    TEST_TRACING.call_once(|| {
        if std::env::var(TEST_LOG_ENV_NAME).is_err() {
            return;
        }

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{LIBRARY_TARGET}=debug")));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}

fn default_directives(app_name: &str) -> String {
    let app_target = app_name.replace('-', "_");
    if app_target == LIBRARY_TARGET {
        return format!("{LIBRARY_TARGET}=info");
    }

    format!("{LIBRARY_TARGET}=info,{app_target}=info")
}
