//! Tracing initialization

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the log filter
pub const LOG_ENV_VAR: &str = "DRIVEGUARD_LOG";

static INIT: Once = Once::new();

/// Initialize the DriveGuard tracing/logging system.
///
/// Reads `DRIVEGUARD_LOG` for the filter, e.g. `DRIVEGUARD_LOG=driveguard=debug`.
/// Falls back to `driveguard=info` if unset or invalid. Output goes to stderr so
/// it never mixes with JSON written to stdout.
///
/// Calling this more than once is a no-op.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
            .unwrap_or_else(|_| EnvFilter::new("driveguard=info"));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true),
            )
            .with(filter)
            .init();
    });
}
