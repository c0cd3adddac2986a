use crate::errors::ProxyError;
use crate::version::parse_core;

/// Checks that a caller-supplied version is a plain `x.y.z` semantic version.
pub fn validate_version(version: &str) -> Result<(), ProxyError> {
    if parse_core(version).is_none() {
        tracing::warn!(version, "Invalid version");
        return Err(ProxyError::InvalidVersion);
    }
    tracing::debug!(version, "Version is valid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::INVALID_VERSION;
    use http::StatusCode;

    #[test]
    fn test_valid_versions() {
        for v in [
            "0.0.0",
            "1.0.0",
            "1.2.3",
            "10.0.100",
            "18446744073709551616.0.0",
            "0.0.123456789012345678901",
        ] {
            assert!(validate_version(v).is_ok(), "{v}");
        }
    }

    #[test]
    fn test_invalid_versions() {
        for v in ["", "1.0", "1.0.0.0", "01.0.0", "abc", "1.0.0-rc.1"] {
            let err = validate_version(v).unwrap_err();
            assert!(matches!(err, ProxyError::InvalidVersion), "{v}");
            assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
            assert_eq!(err.to_string(), INVALID_VERSION);
        }
    }
}
