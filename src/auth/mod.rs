//! Authentication helpers and token providers.
//!
//! The platform-specific exchanges (IAM API key for the cloud platform,
//! username/password for Software Hub) sit behind [`PlatformAuthStrategy`].
//! [`manager::AuthenticationManager`] selects one of them at construction and
//! serves cached Bearer values through [`cache::TokenCache`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

pub mod cache;
pub mod cloud;
pub mod credentials;
pub mod crn;
pub mod manager;
pub mod software_hub;

pub use cache::{CacheKey, TokenCache};
pub use cloud::CloudStrategy;
pub use credentials::{CloudCredentials, Credentials, SoftwareHubCredentials};
pub use crn::{Crn, CrnValidationError};
pub use manager::AuthenticationManager;
pub use software_hub::SoftwareHubStrategy;

/// The two MDM deployment flavours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Platform {
    /// IBM Cloud hosted SaaS, authenticated through IAM.
    Cloud,
    /// Self-hosted Software Hub (Cloud Pak for Data), authenticated with username/password.
    SoftwareHub,
}

impl Platform {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::SoftwareHub => "softwareHub",
        }
    }

    /// Authorization scheme expected by the platform's data and model services.
    pub const fn header_scheme(&self) -> &'static str {
        match self {
            Self::Cloud | Self::SoftwareHub => "Bearer",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cloud" | "ibm_cloud" | "saas" => Ok(Self::Cloud),
            "cpd" | "software_hub" | "softwarehub" | "software-hub" => Ok(Self::SoftwareHub),
            other => Err(AuthError::InvalidConfiguration(format!(
                "Unknown platform '{other}'. Valid options: cloud, cpd"
            ))),
        }
    }
}

/// A bearer token together with its absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub platform: Platform,
}

impl CachedToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>, platform: Platform) -> Self {
        Self {
            value: value.into(),
            expires_at,
            platform,
        }
    }

    /// Build a token from a declared time-to-live, relative to `issued_at`.
    pub fn from_ttl(
        value: impl Into<String>,
        ttl: TimeDelta,
        platform: Platform,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self::new(value, issued_at + ttl, platform)
    }

    /// Whether the token may still be handed out at `now`, keeping `margin` in reserve.
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        now < self.expires_at - margin
    }

    /// Value for the `Authorization` header, e.g. `Bearer eyJ...`.
    pub fn header_value(&self) -> String {
        format!("{} {}", self.platform.header_scheme(), self.value)
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("platform", &self.platform)
            .finish()
    }
}

/// A platform-specific credential exchange.
///
/// Implementations perform exactly one network exchange per call; caching,
/// coalescing and retries are layered on top by the manager.
#[async_trait]
pub trait PlatformAuthStrategy: Send + Sync {
    /// Platform served by this strategy.
    fn platform(&self) -> Platform;

    /// Trade long-lived credentials for a short-lived bearer token.
    async fn acquire_token(&self, credentials: &Credentials) -> Result<CachedToken, AuthError>;
}

/// Trim an error body down to something fit for an error message.
pub(crate) fn response_excerpt(body: &str) -> String {
    const MAX_CHARS: usize = 256;
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    if trimmed.chars().count() <= MAX_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(MAX_CHARS).collect();
        format!("{head}...")
    }
}
