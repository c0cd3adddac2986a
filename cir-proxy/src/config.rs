use instrument::config::{Config as InstrumentConfig, ConfigError as InstrumentConfigError};
use serde::Deserialize;
use shared::statsd::{MetricsConfig, default_statsd_port};
use std::collections::HashMap;
use std::fs::File;

pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const SENTRY_DSN: &str = "SENTRY_DSN";
pub const STATSD_HOST: &str = "STATSD_HOST";
pub const STATSD_PORT: &str = "STATSD_PORT";

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of DEBUG, INFO, WARNING, ERROR, CRITICAL. Unknown values mean INFO.
    pub level: String,
    pub sentry_dsn: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "INFO".into(),
            sentry_dsn: None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub instrument: InstrumentConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.instrument.validate()?;

        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_kv(&std::env::vars().collect())
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| kv.get(key).filter(|v| !v.is_empty()).cloned();

        let logging = LoggingConfig {
            level: get(LOG_LEVEL).unwrap_or_else(|| LoggingConfig::default().level),
            sentry_dsn: get(SENTRY_DSN),
        };

        let metrics = match get(STATSD_HOST) {
            Some(statsd_host) => {
                let statsd_port = match get(STATSD_PORT) {
                    Some(port) => port
                        .parse()
                        .map_err(|_| ConfigError::InvalidStatsdPort(port))?,
                    None => default_statsd_port(),
                };
                Some(MetricsConfig {
                    statsd_host,
                    statsd_port,
                })
            }
            None => None,
        };

        Ok(Config {
            logging,
            metrics,
            instrument: InstrumentConfig::from_kv(kv)?,
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] InstrumentConfigError),
    #[error("STATSD_PORT must be a port number, got {0:?}")]
    InvalidStatsdPort(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use url::Url;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    fn kv(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn file_config() {
        let yaml = r#"
            logging:
                level: DEBUG
                sentry_dsn: https://key@sentry.example.com/1
            metrics:
                statsd_host: 127.0.0.1
            instrument:
                listener:
                    host: 0.0.0.0
                    port: 8080
                cir:
                    base_url: https://cir.example.com
                    iap_client_id: cir-audience
                converter:
                    base_url: http://converter:5010
            "#;
        let tmp = write_tmp_file(yaml);
        let config = Config::from_file(tmp.path()).expect("load config");

        assert_eq!(config.logging.level, "DEBUG");
        assert_eq!(config.metrics.expect("metrics").statsd_port, 8125);
        assert_eq!(config.instrument.listener.port, 8080);
        assert_eq!(
            config.instrument.cir.base_url,
            Some(Url::parse("https://cir.example.com").unwrap())
        );
        assert_eq!(
            config.instrument.cir.retrieve_endpoint,
            "/v2/retrieve_collection_instrument"
        );
        assert_eq!(config.instrument.converter.convert_endpoint, "/schema");
    }

    #[test]
    fn empty_file_uses_defaults() {
        let tmp = write_tmp_file("{}");
        let config = Config::from_file(tmp.path()).expect("load config");
        assert_eq!(config, Config::default());
    }

    #[test]
    fn file_with_zero_port_is_rejected() {
        let tmp = write_tmp_file("instrument:\n  listener:\n    host: 0.0.0.0\n    port: 0\n");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::Invalid(InstrumentConfigError::InvalidPort))
        ));
    }

    #[test]
    fn env_config() {
        let config = Config::from_kv(&kv(&[
            (LOG_LEVEL, "WARNING"),
            (STATSD_HOST, "statsd.local"),
            (STATSD_PORT, "9125"),
            ("CIR_API_BASE_URL", "http://localhost:5004"),
        ]))
        .expect("env config");

        assert_eq!(config.logging.level, "WARNING");
        assert_eq!(config.logging.sentry_dsn, None);
        let metrics = config.metrics.expect("metrics");
        assert_eq!(metrics.statsd_host, "statsd.local");
        assert_eq!(metrics.statsd_port, 9125);
        assert!(config.instrument.cir.base_url.is_some());
    }

    #[test]
    fn env_defaults() {
        let config = Config::from_kv(&HashMap::new()).expect("env config");
        assert_eq!(config.logging.level, "INFO");
        assert!(config.metrics.is_none());
        assert_eq!(config.instrument.listener.port, 3000);
    }

    #[test]
    fn env_bad_statsd_port() {
        let err = Config::from_kv(&kv(&[(STATSD_HOST, "s"), (STATSD_PORT, "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidStatsdPort(_)));
    }
}
