//! Tracing subscriber setup shared by the binaries.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Filter used when `RUST_LOG` is unset
pub fn default_filter(logging: &LoggingConfig) -> String {
    format!("fieldforge={},tower_http=debug", logging.level)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Calling this twice is a no-op; the second subscriber is dropped.
pub fn init(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(logging)));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if logging.format.eq_ignore_ascii_case("json") {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_uses_level() {
        let logging = LoggingConfig {
            level: "debug".into(),
            format: "pretty".into(),
        };
        assert_eq!(default_filter(&logging), "fieldforge=debug,tower_http=debug");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        let logging = LoggingConfig {
            level: "info".into(),
            format: "json".into(),
        };
        init(&logging);
        init(&logging);
    }
}
