//! AWS error classification
//!
//! Every SDK failure is reduced to an [`AwsError`] using the error code from
//! `ProvideErrorMetadata`, so the collector can decide between retrying the
//! page (rate limiting) and failing the kind (everything else).

use aws_sdk_sts::error::{DisplayErrorContext, ProvideErrorMetadata};
use thiserror::Error;

use crate::aws::paginate::Throttling;

/// AWS error categories for retry and reporting
#[derive(Debug, Clone, Error)]
pub enum AwsError {
    /// Rate limit exceeded (retryable with backoff)
    #[error("Rate limit exceeded ({code})")]
    Throttled { code: String },

    /// Caller lacks permission for the listing call
    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    /// Listed container vanished or never existed
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Request or response rejected as malformed
    #[error("Malformed request: {message}")]
    Malformed { message: String },

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    /// Classify any SDK error (`SdkError<E, R>` or a modeled operation error)
    pub fn from_sdk<E>(err: E) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error,
    {
        let message = match err.message() {
            Some(m) => m.to_string(),
            None => DisplayErrorContext(&err).to_string(),
        };
        classify_aws_error(err.code(), Some(&message))
    }

    /// Check if this is a rate-limit error
    pub fn is_retryable(&self) -> bool {
        matches!(self, AwsError::Throttled { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, AwsError::AccessDenied { .. })
    }
}

impl Throttling for AwsError {
    fn is_throttled(&self) -> bool {
        self.is_retryable()
    }
}

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "TooManyRequestsException",
    "RequestLimitExceeded",
    "RequestThrottled",
    "RequestThrottledException",
    "SlowDown",
    "ProvisionedThroughputExceededException",
    "LimitExceededException",
];

/// Known AWS error codes for missing permissions
const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "UnrecognizedClientException",
    "NotAuthorizedException",
    "AuthorizationError",
    "ExpiredToken",
    "ExpiredTokenException",
    "InvalidClientTokenId",
];

/// Known AWS error codes for "not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "NotFoundException",
    "ResourceNotFoundException",
    "NoSuchEntity",
    "NoSuchBucket",
    "WAFNonexistentItemException",
    "NoSuchCachePolicy",
    "NoSuchDistribution",
    "NoSuchOriginAccessControl",
    "NoSuchResponseHeadersPolicy",
];

/// Known AWS error codes for rejected requests
const MALFORMED_CODES: &[&str] = &[
    "ValidationError",
    "ValidationException",
    "InvalidParameterValue",
    "InvalidParameterException",
    "InvalidParameterValueException",
    "InvalidInput",
    "InvalidArgument",
    "InvalidNextToken",
    "InvalidNextTokenException",
    "InvalidPaginationToken",
    "BadRequestException",
    "SerializationException",
    "WAFInvalidParameterException",
];

/// Classify an AWS SDK error using the error code.
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled {
            code: c.to_string(),
        },
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => AwsError::AccessDenied { message },
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound { message },
        Some(c) if MALFORMED_CODES.contains(&c) => AwsError::Malformed { message },
        // Some services only signal throttling in the message
        Some(_) if message.contains("Rate exceeded") => AwsError::Throttled {
            code: code.unwrap_or_default().to_string(),
        },
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}
