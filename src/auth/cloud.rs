//! IAM API key exchange for the cloud platform.
//!
//! Implements the `urn:ibm:params:oauth:grant-type:apikey` grant: the API key
//! is posted as a form to the IAM token endpoint, which answers with an
//! `access_token` and its lifetime in `expires_in` seconds. The instance CRN is
//! validated before any request is made.

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use reqwest::Client;
use reqwest::header::ACCEPT;
use secrecy::ExposeSecret;
use serde::Deserialize;

use super::credentials::{CloudCredentials, Credentials};
use super::{CachedToken, Platform, PlatformAuthStrategy, crn, response_excerpt};
use crate::error::AuthError;

/// Public IAM token endpoint.
pub const DEFAULT_IAM_TOKEN_URL: &str = "https://iam.cloud.ibm.com/identity/token";
/// Grant type for API key exchanges.
pub const IAM_APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

#[derive(Debug, Deserialize)]
struct IamTokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    token_type: Option<String>,
}

/// Exchanges an API key for an IAM access token.
#[derive(Debug, Clone)]
pub struct CloudStrategy {
    http: Client,
}

impl CloudStrategy {
    /// `http` must use public-trust TLS; see [`crate::http::build_http_client`].
    pub fn new(http: Client) -> Self {
        Self { http }
    }

    pub async fn acquire_token(
        &self,
        credentials: &CloudCredentials,
    ) -> Result<CachedToken, AuthError> {
        let crn = crn::validate(&credentials.crn)
            .map_err(|e| AuthError::malformed_crn(&credentials.crn, e))?;

        tracing::debug!(
            platform = %Platform::Cloud,
            auth_url = %credentials.auth_url,
            service_instance = crn.service_instance(),
            "requesting IAM access token"
        );

        let form = [
            ("grant_type", IAM_APIKEY_GRANT_TYPE),
            ("apikey", credentials.api_key.expose_secret()),
        ];
        let response = self
            .http
            .post(&credentials.auth_url)
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::from_transport(Platform::Cloud, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::exchange_failed(
                Some(status.as_u16()),
                Platform::Cloud,
                response_excerpt(&body),
            ));
        }

        let body: IamTokenResponse = response.json().await.map_err(|e| {
            AuthError::exchange_failed(
                Some(status.as_u16()),
                Platform::Cloud,
                format!("Failed to parse IAM token response: {e}"),
            )
        })?;

        if body.access_token.is_empty() {
            return Err(AuthError::exchange_failed(
                Some(status.as_u16()),
                Platform::Cloud,
                "IAM token response contained an empty access_token",
            ));
        }
        if body.expires_in <= 0 {
            return Err(AuthError::exchange_failed(
                Some(status.as_u16()),
                Platform::Cloud,
                format!("IAM token response declared a non-positive expires_in ({})", body.expires_in),
            ));
        }
        if let Some(token_type) = body.token_type.as_deref()
            && !token_type.eq_ignore_ascii_case("bearer")
        {
            tracing::warn!(token_type, "IAM returned an unexpected token type");
        }

        Ok(CachedToken::from_ttl(
            body.access_token,
            TimeDelta::seconds(body.expires_in),
            Platform::Cloud,
            Utc::now(),
        ))
    }
}

#[async_trait]
impl PlatformAuthStrategy for CloudStrategy {
    fn platform(&self) -> Platform {
        Platform::Cloud
    }

    async fn acquire_token(&self, credentials: &Credentials) -> Result<CachedToken, AuthError> {
        match credentials {
            Credentials::Cloud(cloud) => CloudStrategy::acquire_token(self, cloud).await,
            other => Err(AuthError::InvalidConfiguration(format!(
                "cloud strategy cannot exchange {} credentials",
                other.platform()
            ))),
        }
    }
}
