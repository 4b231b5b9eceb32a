use std::fmt::Display;

use console::Style;

const ANSI_CYAN: Style = Style::new().cyan();
const ANSI_RED: Style = Style::new().red().bold();

/// Environment variable holding the log filter, e.g. `bakehouse=debug`.
pub const LOG_ENV: &str = "BAKEHOUSE_LOG";

/// Prefix for progress lines printed by recipes.
pub(crate) fn prefix() -> impl Display {
    ANSI_CYAN.apply_to("[bakehouse]")
}

pub(crate) fn error_label() -> impl Display {
    ANSI_RED.apply_to("error:")
}

/// Installs a `tracing` subscriber writing to stderr.
///
/// The filter is read from `BAKEHOUSE_LOG` and defaults to `warn`. Calling
/// this more than once, or after another subscriber was installed, does
/// nothing.
#[cfg(feature = "logging")]
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init_logging() {}
