//! Error Handling Module
//!
//! Two layers of errors live here:
//! - [`AuthError`]: everything the authentication core can report. It is `Clone`
//!   so that every caller coalesced onto one token refresh observes the same outcome.
//! - [`MdmError`]: what the outbound HTTP adapter reports to the service layer.
//!
//! ```rust,ignore
//! use mdm_mcp::error::AuthError;
//!
//! let err = AuthError::exchange_failed(Some(503), Platform::Cloud, "unavailable");
//! assert!(err.is_retryable());
//! ```

use thiserror::Error;

use crate::auth::Platform;

/// Errors raised while acquiring or validating credentials.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The configured CRN does not match the resource-name schema. Fatal, cloud only.
    #[error("Malformed CRN '{crn}': {reason}")]
    MalformedCrn { crn: String, reason: String },

    /// A required credential field is absent. Fatal, raised at startup.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Configuration present but unusable (bad URL, bad number, platform mismatch).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The identity endpoint rejected the exchange or answered with an unusable body.
    #[error("Token exchange failed for {platform} platform{}: {message}", status_suffix(.status_code))]
    AuthExchangeFailed {
        status_code: Option<u16>,
        platform: Platform,
        message: String,
    },

    /// The exchange did not complete within the configured timeout.
    #[error("Token exchange timed out for {platform} platform: {message}")]
    NetworkTimeout { platform: Platform, message: String },

    /// Connection-level failure talking to the identity endpoint.
    #[error("Network error during token exchange for {platform} platform: {message}")]
    Network { platform: Platform, message: String },

    /// The coordinated refresh task itself failed (it never produced an outcome).
    #[error("Token refresh coordination failed: {0}")]
    CacheCoalescingFailure(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl AuthError {
    pub fn malformed_crn(crn: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::MalformedCrn {
            crn: crn.into(),
            reason: reason.to_string(),
        }
    }

    pub fn exchange_failed(
        status_code: Option<u16>,
        platform: Platform,
        message: impl Into<String>,
    ) -> Self {
        Self::AuthExchangeFailed {
            status_code,
            platform,
            message: message.into(),
        }
    }

    /// Classify a transport failure from reqwest.
    pub fn from_transport(platform: Platform, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::NetworkTimeout {
                platform,
                message: error.to_string(),
            }
        } else {
            Self::Network {
                platform,
                message: error.to_string(),
            }
        }
    }

    /// HTTP status of the failed exchange, when one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::AuthExchangeFailed { status_code, .. } => *status_code,
            _ => None,
        }
    }

    /// The platform the error originated from, if it is platform specific.
    pub fn platform(&self) -> Option<Platform> {
        match self {
            Self::MalformedCrn { .. } => Some(Platform::Cloud),
            Self::AuthExchangeFailed { platform, .. }
            | Self::NetworkTimeout { platform, .. }
            | Self::Network { platform, .. } => Some(*platform),
            _ => None,
        }
    }

    /// Transient failures that a bounded retry may cure.
    ///
    /// Rejected credentials (4xx) are never retryable; only timeouts,
    /// connection failures and server-side (5xx / 429) answers are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkTimeout { .. } | Self::Network { .. } => true,
            Self::AuthExchangeFailed {
                status_code: Some(code),
                ..
            } => *code >= 500 || *code == 429,
            _ => false,
        }
    }

    /// Configuration and validation errors; surfaced immediately and never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedCrn { .. } | Self::MissingCredentials(_) | Self::InvalidConfiguration(_)
        )
    }

    /// Convert a transient error into the terminal form reported once the retry
    /// budget is exhausted.
    pub fn into_terminal(self) -> Self {
        match self {
            Self::NetworkTimeout { platform, message } => Self::AuthExchangeFailed {
                status_code: None,
                platform,
                message: format!("timed out: {message}"),
            },
            Self::Network { platform, message } => Self::AuthExchangeFailed {
                status_code: None,
                platform,
                message,
            },
            other => other,
        }
    }
}

/// Errors surfaced by the outbound adapter and the crate's ambient helpers.
#[derive(Debug, Clone, Error)]
pub enum MdmError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The data or model service answered with a non-success status.
    #[error("API error {status}: {message}")]
    Api {
        status: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to initialize telemetry: {0}")]
    TelemetryInit(String),
}

impl MdmError {
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Auth(err) => err.status_code(),
            _ => None,
        }
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Auth(_)) || self.status_code() == Some(401)
    }
}
