//! Per-platform credential sets.
//!
//! Loaded once at startup and never mutated afterwards. Secrets are kept in
//! [`SecretString`] so they stay out of `Debug` output and logs.

use secrecy::{ExposeSecret, SecretString};

use super::Platform;
use super::cache::CacheKey;

/// IAM API key credentials for the cloud platform.
#[derive(Debug)]
pub struct CloudCredentials {
    pub api_key: SecretString,
    /// Instance CRN; validated by the cloud strategy before every exchange.
    pub crn: String,
    /// IAM token endpoint.
    pub auth_url: String,
    /// Base URL of the data and model services.
    pub base_url: String,
}

impl CloudCredentials {
    pub fn new(
        api_key: impl Into<String>,
        crn: impl Into<String>,
        auth_url: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: SecretString::from(api_key.into()),
            crn: crn.into(),
            auth_url: auth_url.into(),
            base_url: base_url.into(),
        }
    }
}

/// Username/password credentials for a Software Hub installation.
#[derive(Debug)]
pub struct SoftwareHubCredentials {
    pub username: String,
    pub password: SecretString,
    /// On-premises authorize endpoint.
    pub auth_url: String,
    pub base_url: String,
}

impl SoftwareHubCredentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        auth_url: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            auth_url: auth_url.into(),
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug)]
pub enum Credentials {
    Cloud(CloudCredentials),
    SoftwareHub(SoftwareHubCredentials),
}

impl Credentials {
    pub fn platform(&self) -> Platform {
        match self {
            Self::Cloud(_) => Platform::Cloud,
            Self::SoftwareHub(_) => Platform::SoftwareHub,
        }
    }

    pub fn auth_url(&self) -> &str {
        match self {
            Self::Cloud(c) => &c.auth_url,
            Self::SoftwareHub(c) => &c.auth_url,
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            Self::Cloud(c) => &c.base_url,
            Self::SoftwareHub(c) => &c.base_url,
        }
    }

    /// Configured CRN; cloud only.
    pub fn crn(&self) -> Option<&str> {
        match self {
            Self::Cloud(c) => Some(&c.crn),
            Self::SoftwareHub(_) => None,
        }
    }

    /// Stable identity used by the token cache.
    pub fn cache_key(&self) -> CacheKey {
        match self {
            Self::Cloud(c) => CacheKey::new(
                Platform::Cloud,
                &c.auth_url,
                &CacheKey::fingerprint(c.api_key.expose_secret()),
            ),
            Self::SoftwareHub(c) => CacheKey::new(Platform::SoftwareHub, &c.auth_url, &c.username),
        }
    }
}

impl From<CloudCredentials> for Credentials {
    fn from(value: CloudCredentials) -> Self {
        Self::Cloud(value)
    }
}

impl From<SoftwareHubCredentials> for Credentials {
    fn from(value: SoftwareHubCredentials) -> Self {
        Self::SoftwareHub(value)
    }
}
