use crate::client::{Service, Upstream};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const LISTEN_HOST: &str = "LISTEN_HOST";
pub const LISTEN_PORT: &str = "LISTEN_PORT";
pub const UPSTREAM_TIMEOUT_SECS: &str = "UPSTREAM_TIMEOUT_SECS";
pub const GCE_METADATA_HOST: &str = "GCE_METADATA_HOST";
pub const CIR_API_BASE_URL: &str = "CIR_API_BASE_URL";
pub const CIR_RETRIEVE_CI_ENDPOINT: &str = "CIR_RETRIEVE_CI_ENDPOINT";
pub const CIR_RETRIEVE_CI_METADATA_ENDPOINT: &str = "CIR_RETRIEVE_CI_METADATA_ENDPOINT";
pub const CIR_IAP_CLIENT_ID: &str = "CIR_IAP_CLIENT_ID";
pub const CONVERTER_SERVICE_API_BASE_URL: &str = "CONVERTER_SERVICE_API_BASE_URL";
pub const CONVERTER_SERVICE_CONVERT_CI_ENDPOINT: &str = "CONVERTER_SERVICE_CONVERT_CI_ENDPOINT";
pub const CONVERTER_SERVICE_IAP_CLIENT_ID: &str = "CONVERTER_SERVICE_IAP_CLIENT_ID";

const DEFAULT_RETRIEVE_ENDPOINT: &str = "/v2/retrieve_collection_instrument";
const DEFAULT_METADATA_ENDPOINT: &str = "/v3/ci-metadata";
const DEFAULT_CONVERT_ENDPOINT: &str = "/schema";
const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key} is not a valid URL: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{key} must be a non-negative integer, got {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Upstream timeout cannot be 0")]
    InvalidTimeout,
}

/// Instrument proxy configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener for incoming requests
    pub listener: Listener,
    /// Collection Instrument Repository settings
    pub cir: CirConfig,
    /// Converter service settings
    pub converter: ConverterConfig,
    /// Where identity tokens for secured upstreams come from
    pub identity: IdentityConfig,
    /// Deadline applied to every outbound request, in seconds
    pub upstream_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            cir: CirConfig::default(),
            converter: ConverterConfig::default(),
            identity: IdentityConfig::default(),
            upstream_timeout_secs: DEFAULT_UPSTREAM_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Builds the configuration from environment-style key/value pairs.
    ///
    /// Unset endpoint keys take their defaults. A key that is present but empty
    /// is kept empty and reported as missing when a request needs it.
    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let listener = Listener {
            host: kv
                .get(LISTEN_HOST)
                .filter(|h| !h.is_empty())
                .cloned()
                .unwrap_or(defaults.listener.host),
            port: parse_number(kv, LISTEN_PORT)?.unwrap_or(defaults.listener.port),
        };

        let cir = CirConfig {
            base_url: parse_url(kv, CIR_API_BASE_URL)?,
            retrieve_endpoint: string_or(kv, CIR_RETRIEVE_CI_ENDPOINT, DEFAULT_RETRIEVE_ENDPOINT),
            metadata_endpoint: string_or(
                kv,
                CIR_RETRIEVE_CI_METADATA_ENDPOINT,
                DEFAULT_METADATA_ENDPOINT,
            ),
            iap_client_id: non_empty(kv, CIR_IAP_CLIENT_ID),
        };

        let converter = ConverterConfig {
            base_url: parse_url(kv, CONVERTER_SERVICE_API_BASE_URL)?,
            convert_endpoint: string_or(
                kv,
                CONVERTER_SERVICE_CONVERT_CI_ENDPOINT,
                DEFAULT_CONVERT_ENDPOINT,
            ),
            iap_client_id: non_empty(kv, CONVERTER_SERVICE_IAP_CLIENT_ID),
        };

        let identity = IdentityConfig {
            metadata_host: non_empty(kv, GCE_METADATA_HOST)
                .unwrap_or(defaults.identity.metadata_host),
        };

        let config = Config {
            listener,
            cir,
            converter,
            identity,
            upstream_timeout_secs: parse_number(kv, UPSTREAM_TIMEOUT_SECS)?
                .unwrap_or(defaults.upstream_timeout_secs),
        };
        config.validate()?;

        Ok(config)
    }

    /// Validates the proxy configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listener.validate()?;
        if self.upstream_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct CirConfig {
    pub base_url: Option<Url>,
    pub retrieve_endpoint: String,
    pub metadata_endpoint: String,
    /// Identity audience of the CIR deployment. Unset means a local, unsecured CIR.
    pub iap_client_id: Option<String>,
}

impl Default for CirConfig {
    fn default() -> Self {
        CirConfig {
            base_url: None,
            retrieve_endpoint: DEFAULT_RETRIEVE_ENDPOINT.into(),
            metadata_endpoint: DEFAULT_METADATA_ENDPOINT.into(),
            iap_client_id: None,
        }
    }
}

impl CirConfig {
    pub fn upstream(&self) -> Upstream<'_> {
        Upstream::new(
            Service::Cir,
            self.base_url.as_ref(),
            self.iap_client_id.as_deref(),
        )
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConverterConfig {
    pub base_url: Option<Url>,
    pub convert_endpoint: String,
    pub iap_client_id: Option<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        ConverterConfig {
            base_url: None,
            convert_endpoint: DEFAULT_CONVERT_ENDPOINT.into(),
            iap_client_id: None,
        }
    }
}

impl ConverterConfig {
    pub fn upstream(&self) -> Upstream<'_> {
        Upstream::new(
            Service::Converter,
            self.base_url.as_ref(),
            self.iap_client_id.as_deref(),
        )
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdentityConfig {
    /// Host (and optional port) of the compute metadata server
    pub metadata_host: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig {
            metadata_host: DEFAULT_METADATA_HOST.into(),
        }
    }
}

fn non_empty(kv: &HashMap<String, String>, key: &str) -> Option<String> {
    kv.get(key).filter(|v| !v.is_empty()).cloned()
}

fn string_or(kv: &HashMap<String, String>, key: &str, default: &str) -> String {
    kv.get(key).cloned().unwrap_or_else(|| default.to_string())
}

fn parse_url(kv: &HashMap<String, String>, key: &'static str) -> Result<Option<Url>, ConfigError> {
    non_empty(kv, key)
        .map(|raw| Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { key, source }))
        .transpose()
}

fn parse_number<T: std::str::FromStr>(
    kv: &HashMap<String, String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    non_empty(kv, key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { key, value: raw })
        })
        .transpose()
}
