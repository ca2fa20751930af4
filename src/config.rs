//! Startup configuration.
//!
//! The platform selector and the credential set for the selected platform are
//! read once, from the process environment (seeded from a `.env` file when one
//! exists). Missing or unusable values are startup errors; nothing here is
//! re-read at runtime.
//!
//! ```rust,ignore
//! let config = AuthConfig::from_env()?;
//! let cache = Arc::new(config.token_cache());
//! let manager = AuthenticationManager::from_config(config, cache)?;
//! ```

use std::time::Duration;

use reqwest::Url;

use crate::auth::cache::{DEFAULT_EXPIRY_MARGIN_SECS, TokenCache};
use crate::auth::software_hub::DEFAULT_TOKEN_TTL_SECS;
use crate::auth::{CloudCredentials, Credentials, Platform, SoftwareHubCredentials};
use crate::error::AuthError;
use crate::retry::RetryPolicy;

/// Environment variable names.
pub mod env {
    pub const TARGET_PLATFORM: &str = "M360_TARGET_PLATFORM";

    pub const CLOUD_API_KEY: &str = "API_CLOUD_API_KEY";
    pub const CLOUD_CRN: &str = "API_CLOUD_CRN";
    pub const CLOUD_AUTH_URL: &str = "API_CLOUD_AUTH_URL";
    pub const CLOUD_BASE_URL: &str = "API_CLOUD_BASE_URL";

    pub const CPD_USERNAME: &str = "API_CPD_USERNAME";
    pub const CPD_PASSWORD: &str = "API_CPD_PASSWORD";
    pub const CPD_AUTH_URL: &str = "API_CPD_AUTH_URL";
    pub const CPD_BASE_URL: &str = "API_CPD_BASE_URL";
    pub const CPD_VERIFY_TLS: &str = "API_CPD_VERIFY_TLS";

    pub const AUTH_TIMEOUT_SECS: &str = "MDM_AUTH_TIMEOUT_SECS";
    pub const AUTH_MAX_RETRIES: &str = "MDM_AUTH_MAX_RETRIES";
    pub const TOKEN_EXPIRY_MARGIN_SECS: &str = "MDM_TOKEN_EXPIRY_MARGIN_SECS";
    pub const TOKEN_DEFAULT_TTL_SECS: &str = "MDM_TOKEN_DEFAULT_TTL_SECS";
}

/// Default exchange timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Knobs for the token exchange, shared by both platforms.
#[derive(Debug, Clone)]
pub struct ExchangeSettings {
    /// Bound on a single exchange request.
    pub timeout: Duration,
    pub connect_timeout: Option<Duration>,
    /// Skip certificate verification. Honoured for Software Hub only.
    pub accept_invalid_certs: bool,
    pub retry: RetryPolicy,
    /// Tokens are treated as expired this long before their literal expiry.
    pub expiry_margin: Duration,
    /// Lifetime assumed when the identity endpoint declares none.
    pub default_token_ttl: Duration,
    pub user_agent: Option<String>,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: None,
            accept_invalid_certs: false,
            retry: RetryPolicy::default(),
            expiry_margin: Duration::from_secs(DEFAULT_EXPIRY_MARGIN_SECS as u64),
            default_token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            user_agent: Some(concat!("mdm-mcp/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

impl ExchangeSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    pub fn with_default_token_ttl(mut self, ttl: Duration) -> Self {
        self.default_token_ttl = ttl;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Reject combinations under which a cached token could never be served.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.timeout.is_zero() {
            return Err(AuthError::InvalidConfiguration(format!(
                "{} must be greater than zero",
                env::AUTH_TIMEOUT_SECS
            )));
        }
        if self.default_token_ttl.is_zero() {
            return Err(AuthError::InvalidConfiguration(format!(
                "{} must be greater than zero",
                env::TOKEN_DEFAULT_TTL_SECS
            )));
        }
        if self.expiry_margin >= self.default_token_ttl {
            return Err(AuthError::InvalidConfiguration(format!(
                "{} ({}s) must be smaller than {} ({}s)",
                env::TOKEN_EXPIRY_MARGIN_SECS,
                self.expiry_margin.as_secs(),
                env::TOKEN_DEFAULT_TTL_SECS,
                self.default_token_ttl.as_secs()
            )));
        }
        Ok(())
    }
}

/// Everything the authentication core needs, resolved once at startup.
#[derive(Debug)]
pub struct AuthConfig {
    pub credentials: Credentials,
    pub settings: ExchangeSettings,
}

impl AuthConfig {
    pub fn new(credentials: impl Into<Credentials>) -> Self {
        Self {
            credentials: credentials.into(),
            settings: ExchangeSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ExchangeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn platform(&self) -> Platform {
        self.credentials.platform()
    }

    /// A cache configured with this config's safety margin.
    pub fn token_cache(&self) -> TokenCache {
        TokenCache::with_margin(self.settings.expiry_margin)
    }

    /// Load from the process environment, after applying a `.env` file if present.
    pub fn from_env() -> Result<Self, AuthError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded environment file");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source { lookup: &lookup };

        let platform: Platform = source
            .required(env::TARGET_PLATFORM)
            .ok_or_else(|| {
                AuthError::MissingCredentials(format!(
                    "{} is not set (expected 'cloud' or 'cpd')",
                    env::TARGET_PLATFORM
                ))
            })?
            .parse()?;

        let credentials = match platform {
            Platform::Cloud => {
                let [api_key, crn, auth_url, base_url] = source.require_all([
                    env::CLOUD_API_KEY,
                    env::CLOUD_CRN,
                    env::CLOUD_AUTH_URL,
                    env::CLOUD_BASE_URL,
                ])?;
                crate::auth::crn::validate(&crn).map_err(|e| AuthError::malformed_crn(&crn, e))?;
                check_url(env::CLOUD_AUTH_URL, &auth_url)?;
                check_url(env::CLOUD_BASE_URL, &base_url)?;
                Credentials::Cloud(CloudCredentials::new(api_key, crn, auth_url, base_url))
            }
            Platform::SoftwareHub => {
                let [username, password, auth_url, base_url] = source.require_all([
                    env::CPD_USERNAME,
                    env::CPD_PASSWORD,
                    env::CPD_AUTH_URL,
                    env::CPD_BASE_URL,
                ])?;
                check_url(env::CPD_AUTH_URL, &auth_url)?;
                check_url(env::CPD_BASE_URL, &base_url)?;
                Credentials::SoftwareHub(SoftwareHubCredentials::new(
                    username, password, auth_url, base_url,
                ))
            }
        };

        let mut settings = ExchangeSettings::default();
        if let Some(secs) = source.parse::<u64>(env::AUTH_TIMEOUT_SECS)? {
            settings.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = source.parse::<u32>(env::AUTH_MAX_RETRIES)? {
            settings.retry = settings.retry.with_max_retries(retries);
        }
        if let Some(secs) = source.parse::<u64>(env::TOKEN_EXPIRY_MARGIN_SECS)? {
            settings.expiry_margin = Duration::from_secs(secs);
        }
        if let Some(secs) = source.parse::<u64>(env::TOKEN_DEFAULT_TTL_SECS)? {
            settings.default_token_ttl = Duration::from_secs(secs);
        }
        if let Some(verify) = source.flag(env::CPD_VERIFY_TLS)? {
            settings.accept_invalid_certs = !verify;
        }
        settings.validate()?;

        tracing::info!(platform = %platform, "authentication configuration loaded");
        Ok(Self {
            credentials,
            settings,
        })
    }
}

struct Source<'a, F> {
    lookup: &'a F,
}

impl<F> Source<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Non-blank value of `name`.
    fn required(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// All of `names`, or one error listing every missing variable.
    fn require_all<const N: usize>(&self, names: [&str; N]) -> Result<[String; N], AuthError> {
        let values = names.map(|name| self.required(name));
        let missing: Vec<&str> = names
            .iter()
            .zip(&values)
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(AuthError::MissingCredentials(format!(
                "required variables not set: {}",
                missing.join(", ")
            )));
        }
        Ok(values.map(Option::unwrap_or_default))
    }

    fn parse<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>, AuthError> {
        self.required(name)
            .map(|raw| {
                raw.parse::<T>().map_err(|_| {
                    AuthError::InvalidConfiguration(format!("{name} has an invalid value '{raw}'"))
                })
            })
            .transpose()
    }

    fn flag(&self, name: &str) -> Result<Option<bool>, AuthError> {
        self.required(name)
            .map(|raw| match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(AuthError::InvalidConfiguration(format!(
                    "{name} must be true or false, found '{raw}'"
                ))),
            })
            .transpose()
    }
}

fn check_url(name: &str, value: &str) -> Result<(), AuthError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|e| AuthError::InvalidConfiguration(format!("{name} is not a valid URL: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const CLOUD_VARS: [(&str, &str); 5] = [
        (env::TARGET_PLATFORM, "cloud"),
        (env::CLOUD_API_KEY, "api-key"),
        (env::CLOUD_CRN, "crn:v1:bluemix:public:mdm:us-south:a/acc:inst::"),
        (env::CLOUD_AUTH_URL, "https://iam.cloud.ibm.com/identity/token"),
        (env::CLOUD_BASE_URL, "https://us-south.mdm.cloud.ibm.com"),
    ];

    #[test]
    fn loads_cloud_configuration() {
        let config = AuthConfig::from_lookup(lookup(&CLOUD_VARS)).unwrap();
        assert_eq!(config.platform(), Platform::Cloud);
        assert_eq!(
            config.credentials.crn(),
            Some("crn:v1:bluemix:public:mdm:us-south:a/acc:inst::")
        );
        assert_eq!(config.settings.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.settings.retry.max_retries, 3);
    }

    #[test]
    fn loads_software_hub_configuration_with_overrides() {
        let config = AuthConfig::from_lookup(lookup(&[
            (env::TARGET_PLATFORM, "cpd"),
            (env::CPD_USERNAME, "admin"),
            (env::CPD_PASSWORD, "secret"),
            (env::CPD_AUTH_URL, "https://cpd.example.com/icp4d-api/v1/authorize"),
            (env::CPD_BASE_URL, "https://cpd.example.com"),
            (env::CPD_VERIFY_TLS, "false"),
            (env::AUTH_MAX_RETRIES, "5"),
            (env::TOKEN_EXPIRY_MARGIN_SECS, "120"),
        ]))
        .unwrap();
        assert_eq!(config.platform(), Platform::SoftwareHub);
        assert!(config.settings.accept_invalid_certs);
        assert_eq!(config.settings.retry.max_retries, 5);
        assert_eq!(config.settings.expiry_margin, Duration::from_secs(120));
    }

    #[test]
    fn missing_platform_is_fatal() {
        let err = AuthConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, AuthError::MissingCredentials(_)));
    }

    #[test]
    fn reports_every_missing_field() {
        let err = AuthConfig::from_lookup(lookup(&[
            (env::TARGET_PLATFORM, "cloud"),
            (env::CLOUD_API_KEY, "key"),
            (env::CLOUD_BASE_URL, "  "),
        ]))
        .unwrap_err();
        let AuthError::MissingCredentials(message) = err else {
            panic!("expected MissingCredentials, got {err:?}");
        };
        assert!(message.contains(env::CLOUD_CRN));
        assert!(message.contains(env::CLOUD_AUTH_URL));
        assert!(message.contains(env::CLOUD_BASE_URL));
        assert!(!message.contains(env::CLOUD_API_KEY));
    }

    #[test]
    fn rejects_unknown_platform_and_bad_values() {
        let err = AuthConfig::from_lookup(lookup(&[(env::TARGET_PLATFORM, "aws")])).unwrap_err();
        assert!(matches!(err, AuthError::InvalidConfiguration(_)));

        let mut vars = CLOUD_VARS.to_vec();
        vars.push((env::AUTH_TIMEOUT_SECS, "soon"));
        let err = AuthConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, AuthError::InvalidConfiguration(_)));

        let mut vars = CLOUD_VARS.to_vec();
        vars[3] = (env::CLOUD_AUTH_URL, "not a url");
        let err = AuthConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, AuthError::InvalidConfiguration(_)));
    }

    #[test]
    fn margin_must_be_below_default_ttl() {
        let mut vars = CLOUD_VARS.to_vec();
        vars.push((env::TOKEN_EXPIRY_MARGIN_SECS, "600"));
        vars.push((env::TOKEN_DEFAULT_TTL_SECS, "600"));
        let err = AuthConfig::from_lookup(lookup(&vars)).unwrap_err();
        let AuthError::InvalidConfiguration(message) = err else {
            panic!("expected InvalidConfiguration, got {err:?}");
        };
        assert!(message.contains(env::TOKEN_EXPIRY_MARGIN_SECS));

        let mut vars = CLOUD_VARS.to_vec();
        vars.push((env::TOKEN_EXPIRY_MARGIN_SECS, "599"));
        vars.push((env::TOKEN_DEFAULT_TTL_SECS, "600"));
        assert!(AuthConfig::from_lookup(lookup(&vars)).is_ok());

        let mut vars = CLOUD_VARS.to_vec();
        vars.push((env::AUTH_TIMEOUT_SECS, "0"));
        assert!(matches!(
            AuthConfig::from_lookup(lookup(&vars)),
            Err(AuthError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn malformed_crn_fails_at_startup() {
        let mut vars = CLOUD_VARS.to_vec();
        vars[2] = (env::CLOUD_CRN, "crn:v1:bluemix");
        let err = AuthConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, AuthError::MalformedCrn { ref crn, .. } if crn == "crn:v1:bluemix"));
        assert!(err.is_fatal());
    }

    #[test]
    fn token_cache_uses_configured_margin() {
        let config = AuthConfig::from_lookup(lookup(&CLOUD_VARS))
            .unwrap()
            .with_settings(ExchangeSettings::new().with_expiry_margin(Duration::from_secs(5)));
        assert_eq!(config.token_cache().margin(), chrono::TimeDelta::seconds(5));
    }
}
