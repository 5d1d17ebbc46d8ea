//! AWS error classification
//!
//! Maps AWS SDK errors onto [`ProviderError`] using the `.code()` reported by
//! the service instead of string matching on Debug output.

use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use integrity_common::ProviderError;

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "InvalidAMIID.NotFound",
    "InvalidAMIID.Unavailable",
    "InvalidInstanceID.NotFound",
];

/// Known AWS error codes for missing, invalid or insufficient credentials
const ACCESS_DENIED_CODES: &[&str] = &[
    "AuthFailure",
    "UnauthorizedOperation",
    "OptInRequired",
    "InvalidClientTokenId",
    "ExpiredToken",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];

/// Classify an AWS error from its code and message.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> ProviderError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => ProviderError::NotFound {
            code: c.to_string(),
            message,
        },
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => ProviderError::AccessDenied {
            code: c.to_string(),
            message,
        },
        Some(c) if THROTTLING_CODES.contains(&c) => ProviderError::Throttled { message },
        _ => ProviderError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Classify an SDK operation error.
///
/// Service errors carry a code and message. Transport failures (timeouts,
/// DNS, connection resets) carry neither, so the full error context is used
/// as the message instead.
pub fn classify_sdk_error<E, R>(error: &SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match error.message() {
        Some(message) => classify_aws_error(error.code(), Some(message)),
        None => classify_aws_error(
            error.code(),
            Some(&DisplayErrorContext(error).to_string()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes() {
        for code in NOT_FOUND_CODES {
            let err = classify_aws_error(Some(code), Some("some message"));
            assert!(
                matches!(err, ProviderError::NotFound { code: ref c, .. } if c.as_str() == *code),
                "Expected NotFound for code: {code}"
            );
        }
    }

    #[test]
    fn access_denied_codes() {
        for code in ACCESS_DENIED_CODES {
            let err = classify_aws_error(Some(code), Some("msg"));
            assert!(
                matches!(err, ProviderError::AccessDenied { .. }),
                "Expected AccessDenied for code: {code}"
            );
        }
    }

    #[test]
    fn throttling_codes() {
        for code in THROTTLING_CODES {
            let err = classify_aws_error(Some(code), Some("msg"));
            assert!(
                matches!(err, ProviderError::Throttled { .. }),
                "Expected Throttled for code: {code}"
            );
        }
    }

    #[test]
    fn unknown_and_missing_codes() {
        let err = classify_aws_error(Some("SomeNewError"), Some("details"));
        assert!(matches!(
            err,
            ProviderError::Sdk { code: Some(ref c), .. } if c == "SomeNewError"
        ));

        let err2 = classify_aws_error(None, None);
        assert_eq!(
            err2,
            ProviderError::Sdk {
                code: None,
                message: "Unknown error".to_string()
            }
        );
    }
}
