//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if let Err(e) = result {
        eprintln!("⚠️  Logging already initialized: {}", e);
    }
}
