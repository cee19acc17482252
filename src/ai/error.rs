//! Provider error types
//!
//! Splits retriable conditions (rate limits, transient server and network
//! failures) from fatal ones so the call sites never rely on a broad catch
//! to decide whether to retry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors that can occur during provider operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProviderError {
    /// API request failed with a non-retriable status
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    /// Authentication failed or credentials are invalid
    AuthenticationError { message: String },

    /// Request timed out after the specified duration (in seconds)
    TimeoutError { seconds: u64 },

    /// Rate limit exceeded, retry after the specified duration (in seconds)
    RateLimitError { retry_after: Option<u64> },

    /// Retriable server-side failure (HTTP 5xx)
    ServerError { message: String, status_code: u16 },

    /// Invalid or malformed response from the model
    InvalidResponse {
        message: String,
        raw_response: Option<String>,
    },

    /// The provider could not produce a schema-conformant result within the
    /// content-retry budget
    ContentFailure { attempts: u32 },

    /// Configuration error (missing API keys, invalid settings, etc.)
    ConfigurationError { message: String },

    /// Network-related error
    NetworkError { message: String },
}

impl ProviderError {
    /// True for conditions the hosted substrate recovers from with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimitError { .. }
                | ProviderError::ServerError { .. }
                | ProviderError::NetworkError { .. }
                | ProviderError::TimeoutError { .. }
        )
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::ApiError {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "API error ({}): {}", code, message)
                } else {
                    write!(f, "API error: {}", message)
                }
            }
            ProviderError::AuthenticationError { message } => {
                write!(f, "Authentication failed: {}", message)
            }
            ProviderError::TimeoutError { seconds } => {
                write!(f, "Request timed out after {} seconds", seconds)
            }
            ProviderError::RateLimitError { retry_after } => {
                if let Some(seconds) = retry_after {
                    write!(f, "Rate limit exceeded, retry after {} seconds", seconds)
                } else {
                    write!(f, "Rate limit exceeded")
                }
            }
            ProviderError::ServerError {
                message,
                status_code,
            } => {
                write!(f, "Server error ({}): {}", status_code, message)
            }
            ProviderError::InvalidResponse { message, .. } => {
                write!(f, "Invalid response from model: {}", message)
            }
            ProviderError::ContentFailure { attempts } => {
                write!(
                    f,
                    "Provider unable to produce a conformant result after {} attempts",
                    attempts
                )
            }
            ProviderError::ConfigurationError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            ProviderError::NetworkError { message } => {
                write!(f, "Network error: {}", message)
            }
        }
    }
}

impl std::error::Error for ProviderError {}
