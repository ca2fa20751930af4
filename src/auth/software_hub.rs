//! Username/password exchange for Software Hub installations.
//!
//! The authorize endpoint (`/icp4d-api/v1/authorize` on a default install)
//! takes a JSON body with `username` and `password` and answers with a
//! `token`. The lifetime comes from `expires_in` when the endpoint declares
//! one, otherwise from the `exp` claim of the JWT, otherwise from the
//! configured default.
//!
//! Installations commonly front this endpoint with a self-signed or
//! enterprise CA certificate. Whether that is accepted is decided by the HTTP
//! client handed to [`SoftwareHubStrategy::new`], never by the strategy.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use reqwest::header::ACCEPT;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use super::credentials::{Credentials, SoftwareHubCredentials};
use super::{CachedToken, Platform, PlatformAuthStrategy, response_excerpt};
use crate::error::AuthError;

/// Path of the authorize endpoint relative to the installation route.
pub const AUTHORIZE_PATH: &str = "/icp4d-api/v1/authorize";
/// TTL assumed when neither the response nor the token declares one.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

#[derive(Serialize)]
struct AuthorizeRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(rename = "_messageCode_", default)]
    message_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct JwtClaims {
    exp: i64,
}

/// Exchanges a username and password for a platform bearer token.
#[derive(Debug, Clone)]
pub struct SoftwareHubStrategy {
    http: Client,
    default_ttl: TimeDelta,
}

impl SoftwareHubStrategy {
    pub fn new(http: Client) -> Self {
        Self::with_default_ttl(http, Duration::from_secs(DEFAULT_TOKEN_TTL_SECS))
    }

    pub fn with_default_ttl(http: Client, default_ttl: Duration) -> Self {
        let default_ttl = TimeDelta::from_std(default_ttl)
            .unwrap_or_else(|_| TimeDelta::seconds(DEFAULT_TOKEN_TTL_SECS as i64));
        Self { http, default_ttl }
    }

    pub async fn acquire_token(
        &self,
        credentials: &SoftwareHubCredentials,
    ) -> Result<CachedToken, AuthError> {
        tracing::debug!(
            platform = %Platform::SoftwareHub,
            auth_url = %credentials.auth_url,
            username = %credentials.username,
            "requesting Software Hub token"
        );

        let request = AuthorizeRequest {
            username: &credentials.username,
            password: credentials.password.expose_secret(),
        };
        let response = self
            .http
            .post(&credentials.auth_url)
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AuthError::from_transport(Platform::SoftwareHub, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::exchange_failed(
                Some(status.as_u16()),
                Platform::SoftwareHub,
                response_excerpt(&body),
            ));
        }

        let body: AuthorizeResponse = response.json().await.map_err(|e| {
            AuthError::exchange_failed(
                Some(status.as_u16()),
                Platform::SoftwareHub,
                format!("Failed to parse authorize response: {e}"),
            )
        })?;

        let token = match body.token {
            Some(token) if !token.is_empty() => token,
            _ => {
                let detail = body
                    .message
                    .or(body.message_code)
                    .unwrap_or_else(|| "no token in response".to_string());
                return Err(AuthError::exchange_failed(
                    Some(status.as_u16()),
                    Platform::SoftwareHub,
                    format!("Authorize response did not contain a token: {detail}"),
                ));
            }
        };

        let now = Utc::now();
        let expires_at = match body.expires_in {
            Some(secs) if secs > 0 => now + TimeDelta::seconds(secs),
            _ => jwt_expiry(&token).unwrap_or(now + self.default_ttl),
        };
        if expires_at <= now {
            return Err(AuthError::exchange_failed(
                Some(status.as_u16()),
                Platform::SoftwareHub,
                format!("Issued token expired at {expires_at}"),
            ));
        }

        Ok(CachedToken::new(token, expires_at, Platform::SoftwareHub))
    }
}

/// Expiry from the `exp` claim of a JWT. The signature is not checked; the
/// platform verifies its own tokens.
fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: JwtClaims = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claims.exp, 0)
}

#[async_trait]
impl PlatformAuthStrategy for SoftwareHubStrategy {
    fn platform(&self) -> Platform {
        Platform::SoftwareHub
    }

    async fn acquire_token(&self, credentials: &Credentials) -> Result<CachedToken, AuthError> {
        match credentials {
            Credentials::SoftwareHub(hub) => SoftwareHubStrategy::acquire_token(self, hub).await,
            other => Err(AuthError::InvalidConfiguration(format!(
                "Software Hub strategy cannot exchange {} credentials",
                other.platform()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwt_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"admin","exp":{exp}}}"#));
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn reads_exp_claim() {
        let token = jwt_with_exp(1_900_000_000);
        assert_eq!(
            jwt_expiry(&token),
            DateTime::from_timestamp(1_900_000_000, 0)
        );
    }

    #[test]
    fn opaque_tokens_have_no_claims() {
        assert_eq!(jwt_expiry("opaque-token"), None);
        assert_eq!(jwt_expiry("a.!!!.c"), None);
    }
}
