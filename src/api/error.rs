//! Error types for Guepard API calls

use thiserror::Error;

/// Errors that can occur while talking to the Guepard API
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// Transport-level failure (DNS, connection reset, TLS, ...)
    #[error("Network error: {0}")]
    Network(String),

    /// The call did not complete within the allotted time
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// Missing or rejected access token (HTTP 401)
    #[error("Unauthorized: check ACCESS_TOKEN")]
    Unauthorized,

    /// Resource does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("API returned {code}: {message}")]
    Status { code: u16, message: String },

    /// Body could not be decoded, or had an unexpected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            ApiError::Network("connection refused".to_string()).to_string(),
            "Network error: connection refused"
        );
        assert_eq!(ApiError::Timeout(10).to_string(), "Request timed out after 10s");
        assert_eq!(
            ApiError::Unauthorized.to_string(),
            "Unauthorized: check ACCESS_TOKEN"
        );
        assert_eq!(
            ApiError::Status {
                code: 500,
                message: "boom".to_string()
            }
            .to_string(),
            "API returned 500: boom"
        );
    }
}
