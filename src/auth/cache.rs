//! In-memory token cache with single-flight refresh.
//!
//! Lookups take a short synchronous lock and never suspend. A miss goes
//! through [`TokenCache::get_or_refresh`]: the first caller for a key spawns the
//! refresh on its own task and registers a shared handle to it; concurrent
//! callers for the same key await that handle instead of starting another
//! exchange. Because the refresh runs detached, it still completes and fills
//! the cache when the caller that triggered it is cancelled.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use sha2::{Digest, Sha256};
use tracing::Instrument;

use super::{CachedToken, Platform};
use crate::error::AuthError;

/// Default safety margin before the literal expiry.
pub const DEFAULT_EXPIRY_MARGIN_SECS: i64 = 60;

type RefreshResult = Result<CachedToken, AuthError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// Cache slot identity: platform, identity endpoint and a stable credential id.
///
/// The parts are kept apart so that no combination of URL and identity can
/// alias another.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    platform: Platform,
    auth_url: String,
    identity: String,
}

impl CacheKey {
    pub fn new(platform: Platform, auth_url: &str, identity: &str) -> Self {
        Self {
            platform,
            auth_url: auth_url.to_string(),
            identity: identity.to_string(),
        }
    }

    /// Non-reversible fingerprint of a secret, safe to keep in a key.
    pub fn fingerprint(secret: &str) -> String {
        Sha256::digest(secret.as_bytes())
            .iter()
            .take(16)
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.platform, self.auth_url, self.identity)
    }
}

struct InFlight {
    generation: u64,
    refresh: SharedRefresh,
}

pub struct TokenCache {
    entries: RwLock<HashMap<CacheKey, CachedToken>>,
    in_flight: Mutex<HashMap<CacheKey, InFlight>>,
    generation: AtomicU64,
    margin: TimeDelta,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::with_margin_delta(TimeDelta::seconds(DEFAULT_EXPIRY_MARGIN_SECS))
    }

    pub fn with_margin(margin: Duration) -> Self {
        let margin = TimeDelta::from_std(margin)
            .unwrap_or_else(|_| TimeDelta::seconds(DEFAULT_EXPIRY_MARGIN_SECS));
        Self::with_margin_delta(margin)
    }

    fn with_margin_delta(margin: TimeDelta) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            margin,
        }
    }

    pub fn margin(&self) -> TimeDelta {
        self.margin
    }

    /// Valid token for `key`, if any.
    pub fn get(&self, key: &CacheKey) -> Option<CachedToken> {
        self.get_at(key, Utc::now())
    }

    /// Valid token for `key` as of `now`: present and `now < expires_at - margin`.
    pub fn get_at(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CachedToken> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|token| token.is_valid_at(now, self.margin))
            .cloned()
    }

    /// Store a token. Tokens already expired at write time are rejected.
    pub fn put(&self, key: CacheKey, token: CachedToken) -> bool {
        self.put_at(key, token, Utc::now())
    }

    pub fn put_at(&self, key: CacheKey, token: CachedToken, now: DateTime<Utc>) -> bool {
        if token.expires_at <= now {
            tracing::warn!(
                platform = %token.platform,
                expires_at = %token.expires_at,
                "refusing to cache an already expired token"
            );
            return false;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, token);
        true
    }

    /// Drop the entry for `key`, returning it.
    pub fn invalidate(&self, key: &CacheKey) -> Option<CachedToken> {
        self.invalidate_if(key, |_| true)
    }

    /// Drop the entry for `key` only if `matches` accepts the token currently
    /// stored. The check and the removal happen under one write lock, so a
    /// token stored by a newer round is left alone.
    pub fn invalidate_if<P>(&self, key: &CacheKey, matches: P) -> Option<CachedToken>
    where
        P: FnOnce(&CachedToken) -> bool,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).is_some_and(matches) {
            entries.remove(key)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a refresh for `key` is currently in flight.
    pub fn is_refreshing(&self, key: &CacheKey) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Return the cached token for `key`, or run `refresh` to obtain one.
    ///
    /// At most one refresh per key runs at any instant. Every caller waiting
    /// on a round receives that round's outcome, success or failure; failures
    /// are not cached, so the next call starts a new round.
    pub async fn get_or_refresh<F, Fut>(self: &Arc<Self>, key: &CacheKey, refresh: F) -> RefreshResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshResult> + Send + 'static,
    {
        if let Some(token) = self.get(key) {
            return Ok(token);
        }

        let pending = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            // A round may have finished between the lookup above and taking the lock.
            if let Some(token) = self.get(key) {
                return Ok(token);
            }
            match in_flight.get(key) {
                Some(existing) => {
                    tracing::debug!(key = %key, "joining in-flight token refresh");
                    existing.refresh.clone()
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let refresh = self.spawn_refresh(key.clone(), generation, refresh());
                    in_flight.insert(
                        key.clone(),
                        InFlight {
                            generation,
                            refresh: refresh.clone(),
                        },
                    );
                    refresh
                }
            }
        };

        pending.await
    }

    fn spawn_refresh<Fut>(self: &Arc<Self>, key: CacheKey, generation: u64, refresh: Fut) -> SharedRefresh
    where
        Fut: Future<Output = RefreshResult> + Send + 'static,
    {
        let cache = Arc::clone(self);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = refresh.await;
            cache.complete_refresh(&task_key, generation, result.as_ref().ok());
            result
        }
        .in_current_span());

        let cache = Arc::clone(self);
        async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) => {
                    cache.finish_refresh(&key, generation);
                    Err(AuthError::CacheCoalescingFailure(format!(
                        "token refresh task did not complete: {join_error}"
                    )))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Store the round's token and retire its in-flight entry as one step,
    /// under the lock `get_or_refresh` holds while choosing between the cache
    /// and joining a round. No caller joins a round whose token is already cached.
    fn complete_refresh(&self, key: &CacheKey, generation: u64, token: Option<&CachedToken>) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = token {
            self.put(key.clone(), token.clone());
        }
        retire(&mut in_flight, key, generation);
    }

    fn finish_refresh(&self, key: &CacheKey, generation: u64) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        retire(&mut in_flight, key, generation);
    }
}

/// Remove the in-flight entry for `key` if it still belongs to `generation`.
fn retire(in_flight: &mut HashMap<CacheKey, InFlight>, key: &CacheKey, generation: u64) {
    if in_flight
        .get(key)
        .is_some_and(|entry| entry.generation == generation)
    {
        in_flight.remove(key);
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("entries", &self.len())
            .field("margin", &self.margin)
            .finish()
    }
}
