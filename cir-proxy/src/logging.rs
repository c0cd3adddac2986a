use crate::config::LoggingConfig;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Map a LOG_LEVEL value to a filter. CRITICAL has no tracing counterpart and
/// maps to ERROR.
pub fn level_filter(level: &str) -> LevelFilter {
    match level.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => LevelFilter::DEBUG,
        "WARNING" | "WARN" => LevelFilter::WARN,
        "ERROR" | "CRITICAL" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

/// Install the global subscriber. The returned guard keeps the sentry client
/// alive and must be held until shutdown.
pub fn init(config: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(&config.level).into())
        .from_env_lossy();

    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(guard.as_ref().map(|_| sentry::integrations::tracing::layer()))
        .init();

    if guard.is_some() {
        tracing::info!("Sentry error reporting enabled");
    }
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        assert_eq!(level_filter("DEBUG"), LevelFilter::DEBUG);
        assert_eq!(level_filter("info"), LevelFilter::INFO);
        assert_eq!(level_filter("WARNING"), LevelFilter::WARN);
        assert_eq!(level_filter("WARN"), LevelFilter::WARN);
        assert_eq!(level_filter("ERROR"), LevelFilter::ERROR);
        assert_eq!(level_filter("CRITICAL"), LevelFilter::ERROR);
        assert_eq!(level_filter("verbose"), LevelFilter::INFO);
        assert_eq!(level_filter(""), LevelFilter::INFO);
    }
}
