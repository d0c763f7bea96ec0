//! Subscriber setup
//!
//! `RUST_LOG` wins over `--log-level`. Logs go to stderr so that JSON and
//! dumps written to stdout stay clean.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

pub(crate) fn init(level: &str, json: bool) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        let subscriber = registry.with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .flatten_event(true),
        );
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = registry.with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(false),
        );
        tracing::subscriber::set_global_default(subscriber)
    }
}
