//! Process bootstrap.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LOG_ENV_VAR, LOG_FORMAT_ENV_VAR};

/// Initialize tracing with the QUEUE_PURGE_LOG environment variable.
///
/// Defaults to "info" level if QUEUE_PURGE_LOG is not set. Setting
/// QUEUE_PURGE_LOG_FORMAT=json switches to one JSON object per line.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json_format(std::env::var(LOG_FORMAT_ENV_VAR).ok().as_deref()) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn json_format(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("json"))
}
