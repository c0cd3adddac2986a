use crate::client::Service;
use crate::identity::IdentityError;
use crate::version::VersionSource;
use http::StatusCode;

pub const INVALID_VERSION: &str =
    "Invalid version format. The version must be in the format x.y.z where x, y, z are numbers.";
pub const INSTRUMENT_NOT_FOUND: &str = "Instrument not found for the provided instrument_id.";
pub const INSTRUMENT_METADATA_NOT_FOUND: &str =
    "Instrument metadata not found for the provided instrument_id.";
pub const INSTRUMENT_PROCESSING: &str = "Error encountered while processing the instrument_id.";
pub const INSTRUMENT_METADATA_PROCESSING: &str =
    "Error encountered while processing the instrument metadata.";
pub const INSTRUMENT_CONVERSION: &str = "Error encountered while converting the instrument.";
pub const INVALID_CONVERSION: &str = "Target version is lower than instrument version.";
pub const INVALID_INSTRUMENT: &str = "Received instrument is not valid.";
pub const TOKEN_ACQUISITION: &str = "Failed to obtain an identity token for the upstream service.";

/// Result type alias for instrument operations
pub type Result<T, E = ProxyError> = std::result::Result<T, E>;

/// Errors raised while serving an instrument request.
///
/// `Display` is the message returned to the caller. Anything that should stay
/// server-side (upstream bodies, transport errors) is only carried in the
/// source and logged.
#[derive(thiserror::Error, Debug)]
pub enum ProxyError {
    #[error("{}", INVALID_VERSION)]
    InvalidVersion,

    #[error("Invalid {source_kind} version: {version}")]
    InvalidVersionFormat {
        source_kind: VersionSource,
        version: String,
    },

    #[error("{}", INVALID_INSTRUMENT)]
    InvalidInstrument,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0} configuration is missing.")]
    Configuration(&'static str),

    #[error("Error connecting to {service}.")]
    Connection {
        service: Service,
        #[source]
        source: reqwest::Error,
    },

    #[error("{message}")]
    Upstream {
        message: &'static str,
        status: Option<StatusCode>,
    },

    #[error("{}", INVALID_CONVERSION)]
    DowngradeNotSupported,

    #[error("{}", TOKEN_ACQUISITION)]
    TokenAcquisition {
        audience: String,
        #[source]
        source: IdentityError,
    },

    #[error("{}", INSTRUMENT_PROCESSING)]
    Internal(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::InvalidVersion
            | ProxyError::InvalidVersionFormat { .. }
            | ProxyError::DowngradeNotSupported => StatusCode::BAD_REQUEST,
            ProxyError::InvalidInstrument | ProxyError::NotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::Configuration(_)
            | ProxyError::Connection { .. }
            | ProxyError::Upstream { .. }
            | ProxyError::TokenAcquisition { .. }
            | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-friendly name, used as a metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::InvalidVersion => "invalid_version",
            ProxyError::InvalidVersionFormat { .. } => "invalid_version_format",
            ProxyError::InvalidInstrument => "invalid_instrument",
            ProxyError::NotFound(_) => "not_found",
            ProxyError::Configuration(_) => "configuration",
            ProxyError::Connection { .. } => "connection",
            ProxyError::Upstream { .. } => "upstream",
            ProxyError::DowngradeNotSupported => "downgrade_not_supported",
            ProxyError::TokenAcquisition { .. } => "token_acquisition",
            ProxyError::Internal(_) => "internal",
        }
    }
}
