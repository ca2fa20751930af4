//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mdm_mcp::prelude::*;

pub const SCENARIO_CRN: &str = "crn:v1:bluemix:public:mdm:ca-tor:a/abc:instance:::";
pub const IAM_PATH: &str = "/identity/token";
pub const AUTHORIZE_PATH: &str = "/icp4d-api/v1/authorize";

pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy::new()
        .with_max_retries(max_retries)
        .with_initial_delay(Duration::from_millis(5))
        .with_max_delay(Duration::from_millis(20))
        .with_jitter(false)
}

pub fn test_settings() -> ExchangeSettings {
    ExchangeSettings::new()
        .with_timeout(Duration::from_secs(5))
        .with_retry_policy(fast_retry(3))
}

pub fn cloud_config(server_uri: &str, crn: &str) -> AuthConfig {
    AuthConfig::new(CloudCredentials::new(
        "test-api-key",
        crn,
        format!("{server_uri}{IAM_PATH}"),
        server_uri,
    ))
    .with_settings(test_settings())
}

pub fn hub_config(server_uri: &str, password: &str) -> AuthConfig {
    AuthConfig::new(SoftwareHubCredentials::new(
        "admin",
        password,
        format!("{server_uri}{AUTHORIZE_PATH}"),
        server_uri,
    ))
    .with_settings(test_settings())
}

pub fn manager(config: AuthConfig) -> AuthenticationManager {
    let cache = Arc::new(config.token_cache());
    AuthenticationManager::from_config(config, cache).expect("manager should build")
}

pub fn iam_body(token: &str, expires_in: i64) -> serde_json::Value {
    serde_json::json!({
        "access_token": token,
        "refresh_token": "not_supported",
        "token_type": "Bearer",
        "expires_in": expires_in,
        "expiration": 1_900_000_000,
        "scope": "ibm openid"
    })
}
