//! Authenticated HTTP access to the MDM data and model services.
//!
//! Every request carries the header produced by [`AuthenticationManager`].
//! On the cloud platform the instance CRN is sent as the `crn` query
//! parameter. A 401 from the service drops the cached token, unless a newer
//! one has replaced it meanwhile, and the request is replayed once.

use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

use crate::auth::{AuthenticationManager, Platform};
use crate::error::MdmError;

#[derive(Debug, Clone)]
pub struct MdmHttpAdapter {
    http: Client,
    base_url: String,
    auth: Arc<AuthenticationManager>,
}

impl MdmHttpAdapter {
    /// Adapter rooted at the base URL of `auth`'s credentials.
    pub fn new(http: Client, auth: Arc<AuthenticationManager>) -> Self {
        let base_url = auth
            .credentials()
            .base_url()
            .trim_end_matches('/')
            .to_string();
        Self {
            http,
            base_url,
            auth,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn auth(&self) -> &Arc<AuthenticationManager> {
        &self.auth
    }

    /// Absolute URL for `path`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, MdmError> {
        self.request(Method::GET, path, query, None).await
    }

    pub async fn post_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value, MdmError> {
        self.request(Method::POST, path, query, Some(body)).await
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, MdmError> {
        let url = self.endpoint(path);
        let mut reauthenticated = false;

        loop {
            let token = self.auth.token().await?;
            let mut request = self
                .http
                .request(method.clone(), &url)
                .header(AUTHORIZATION, token.header_value())
                .header(ACCEPT, "application/json")
                .query(query);
            if self.auth.platform() == Platform::Cloud
                && let Some(crn) = self.auth.credentials().crn()
            {
                request = request.query(&[("crn", crn)]);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            tracing::debug!(target: "mdm_mcp::http", %method, %url, "sending request");
            let response = request
                .send()
                .await
                .map_err(|e| MdmError::Request(format!("{method} {url}: {e}")))?;
            let status = response.status();
            tracing::debug!(target: "mdm_mcp::http", %method, %url, status = status.as_u16(), "received response");

            if status == StatusCode::UNAUTHORIZED && !reauthenticated {
                tracing::warn!(
                    platform = %self.auth.platform(),
                    %url,
                    "service rejected the access token, re-authenticating"
                );
                // Another request may already have replaced the rejected token.
                self.auth.invalidate_if(&token);
                reauthenticated = true;
                continue;
            }

            let text = response
                .text()
                .await
                .map_err(|e| MdmError::Request(format!("{method} {url}: {e}")))?;

            if !status.is_success() {
                return Err(api_error(status, &text));
            }
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_str(&text).map_err(|e| MdmError::Parse(e.to_string()));
        }
    }
}

fn api_error(status: StatusCode, body: &str) -> MdmError {
    let details: Option<Value> = serde_json::from_str(body).ok();
    let message = details
        .as_ref()
        .and_then(error_message)
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                trimmed.chars().take(256).collect()
            }
        });
    MdmError::Api {
        status: status.as_u16(),
        message,
        details,
    }
}

/// Message from the usual error envelopes: `{"message": ..}`,
/// `{"errors": [{"message": ..}]}` or `{"error": ..}`.
fn error_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .or_else(|| {
            body.get("errors")?
                .as_array()?
                .first()?
                .get("message")?
                .as_str()
        })
        .or_else(|| body.get("error").and_then(Value::as_str))
        .map(str::to_string)
}
