pub mod commands;
pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::commands::{LaunchOutcome, Launcher};
pub use crate::core::error::{LauncherError, LauncherResult};
pub use crate::core::events::{EventRelay, LauncherEvent};

/// Installs the global `tracing` subscriber. Logs go to stderr so stdout can
/// carry the event stream.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mango_launcher=debug")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
