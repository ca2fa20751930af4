//! Authentication manager
//!
//! Single entry point for every outbound call that needs an `Authorization`
//! header. The platform strategy is chosen once, at construction; tokens are
//! served from the shared [`TokenCache`] and refreshed through it, so
//! concurrent callers never trigger more than one exchange per credential set.

use std::sync::Arc;

use super::cache::{CacheKey, TokenCache};
use super::cloud::CloudStrategy;
use super::credentials::Credentials;
use super::software_hub::SoftwareHubStrategy;
use super::{CachedToken, Platform, PlatformAuthStrategy};
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::http::build_http_client;
use crate::retry::{RetryExecutor, RetryPolicy};

pub struct AuthenticationManager {
    credentials: Arc<Credentials>,
    strategy: Arc<dyn PlatformAuthStrategy>,
    cache: Arc<TokenCache>,
    retry: RetryPolicy,
    cache_key: CacheKey,
}

impl AuthenticationManager {
    /// Pair `credentials` with a strategy for the same platform.
    pub fn new(
        credentials: impl Into<Credentials>,
        strategy: Arc<dyn PlatformAuthStrategy>,
        cache: Arc<TokenCache>,
    ) -> Result<Self, AuthError> {
        let credentials = credentials.into();
        if strategy.platform() != credentials.platform() {
            return Err(AuthError::InvalidConfiguration(format!(
                "{} strategy cannot serve {} credentials",
                strategy.platform(),
                credentials.platform()
            )));
        }
        let cache_key = credentials.cache_key();
        Ok(Self {
            credentials: Arc::new(credentials),
            strategy,
            cache,
            retry: RetryPolicy::default(),
            cache_key,
        })
    }

    /// Build the manager described by `config`, sharing `cache`.
    pub fn from_config(config: AuthConfig, cache: Arc<TokenCache>) -> Result<Self, AuthError> {
        let platform = config.platform();
        let http = build_http_client(&config.settings, platform)?;
        let strategy: Arc<dyn PlatformAuthStrategy> = match platform {
            Platform::Cloud => Arc::new(CloudStrategy::new(http)),
            Platform::SoftwareHub => Arc::new(SoftwareHubStrategy::with_default_ttl(
                http,
                config.settings.default_token_ttl,
            )),
        };
        tracing::debug!(platform = %platform, "authentication strategy selected");
        Ok(Self::new(config.credentials, strategy, cache)?.with_retry_policy(config.settings.retry))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn platform(&self) -> Platform {
        self.credentials.platform()
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.cache_key
    }

    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// A valid token, from the cache or from a fresh exchange.
    pub async fn token(&self) -> Result<CachedToken, AuthError> {
        if let Some(token) = self.cache.get(&self.cache_key) {
            tracing::debug!(platform = %token.platform, "token cache hit");
            return Ok(token);
        }
        tracing::debug!(platform = %self.platform(), "token cache miss");

        let strategy = Arc::clone(&self.strategy);
        let credentials = Arc::clone(&self.credentials);
        let executor = RetryExecutor::new(self.retry.clone());

        self.cache
            .get_or_refresh(&self.cache_key, move || async move {
                let token = executor
                    .execute(|| {
                        let strategy = Arc::clone(&strategy);
                        let credentials = Arc::clone(&credentials);
                        async move { strategy.acquire_token(&credentials).await }
                    })
                    .await?;
                tracing::info!(
                    platform = %token.platform,
                    expires_at = %token.expires_at,
                    "obtained access token"
                );
                Ok(token)
            })
            .await
    }

    /// `Authorization` header value, e.g. `Bearer eyJ...`.
    pub async fn authorization_header(&self) -> Result<String, AuthError> {
        Ok(self.token().await?.header_value())
    }

    /// Drop the cached token so the next call performs a fresh exchange.
    pub fn invalidate(&self) {
        if self.cache.invalidate(&self.cache_key).is_some() {
            tracing::debug!(platform = %self.platform(), "cached token invalidated");
        }
    }

    /// Drop the cached token only if it is still `rejected`.
    ///
    /// Returns whether an entry was removed. A token obtained by a newer
    /// exchange stays cached.
    pub fn invalidate_if(&self, rejected: &CachedToken) -> bool {
        let removed = self
            .cache
            .invalidate_if(&self.cache_key, |current| current.value == rejected.value)
            .is_some();
        if removed {
            tracing::debug!(platform = %self.platform(), "rejected token invalidated");
        }
        removed
    }
}

impl std::fmt::Debug for AuthenticationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationManager")
            .field("platform", &self.platform())
            .field("cache_key", &self.cache_key)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
