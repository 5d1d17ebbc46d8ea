//! Provider error taxonomy
//!
//! Every remote call made through an [`Ec2Provider`](crate::Ec2Provider)
//! fails with a `ProviderError`. Classification of raw SDK errors into these
//! variants lives next to the SDK client.

use thiserror::Error;

/// Failure of a single remote provider call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Requested resource does not exist
    #[error("resource not found ({code}): {message}")]
    NotFound { code: String, message: String },

    /// Credentials are missing, invalid, or not permitted for the call
    #[error("access denied ({code}): {message}")]
    AccessDenied { code: String, message: String },

    /// Rate limit exceeded
    #[error("rate limit exceeded: {message}")]
    Throttled { message: String },

    /// A paginated listing handed back the token it was just given
    #[error("pagination did not advance: continuation token {token:?} returned twice")]
    Pagination { token: String },

    /// Any other provider failure (including transport errors)
    #[error("provider error ({}): {message}", .code.as_deref().unwrap_or("no code"))]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl ProviderError {
    /// Operator hint for resolving this error, if one is known
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ProviderError::AccessDenied { code, .. } if code == "OptInRequired" => {
                Some("The region is not enabled for this account.")
            }
            ProviderError::AccessDenied { .. } => Some(
                "Check that the credentials are valid and allow ec2:Describe* in every region.",
            ),
            ProviderError::Throttled { .. } => {
                Some("EC2 API rate limit hit. Re-run with a lower --max-concurrency.")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sdk_display_with_and_without_code() {
        let with = ProviderError::Sdk {
            code: Some("InternalError".to_string()),
            message: "oops".to_string(),
        };
        assert_eq!(with.to_string(), "provider error (InternalError): oops");

        let without = ProviderError::Sdk {
            code: None,
            message: "connection reset".to_string(),
        };
        assert_eq!(without.to_string(), "provider error (no code): connection reset");
    }

    #[test]
    fn pagination_display_names_the_token() {
        let err = ProviderError::Pagination {
            token: "page-1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "pagination did not advance: continuation token \"page-1\" returned twice"
        );
    }

    #[test]
    fn suggestions() {
        let opt_in = ProviderError::AccessDenied {
            code: "OptInRequired".to_string(),
            message: "m".to_string(),
        };
        assert!(opt_in.suggestion().unwrap().contains("not enabled"));

        let auth = ProviderError::AccessDenied {
            code: "AuthFailure".to_string(),
            message: "m".to_string(),
        };
        assert!(auth.suggestion().unwrap().contains("ec2:Describe*"));

        let pagination = ProviderError::Pagination {
            token: "t".to_string(),
        };
        assert!(pagination.suggestion().is_none());
    }
}
