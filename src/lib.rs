//! # mdm-mcp
//!
//! Authentication and session management for the MDM MCP server.
//!
#![deny(unsafe_code)]

//! The server talks to master-data services hosted either on IBM Cloud
//! (IAM API key exchange, CRN-scoped instances) or on a self-hosted Software
//! Hub installation (username/password authorize endpoint). This crate turns
//! the configured credentials into short-lived bearer tokens, caches them with
//! a safety margin, coalesces concurrent refreshes and retries transient
//! exchange failures.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mdm_mcp::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let _guard = mdm_mcp::telemetry::init_from_env()?;
//!
//!     let config = AuthConfig::from_env()?;
//!     let cache = Arc::new(config.token_cache());
//!     let http = build_http_client(&config.settings, config.platform())?;
//!     let auth = Arc::new(AuthenticationManager::from_config(config, cache)?);
//!
//!     let adapter = MdmHttpAdapter::new(http, auth);
//!     let model = adapter.get("/mdm/v1/data_model", &[]).await?;
//!     println!("{model}");
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod retry;
pub mod telemetry;

pub use adapter::MdmHttpAdapter;
pub use auth::{
    AuthenticationManager, CachedToken, CloudCredentials, Credentials, Crn, Platform,
    PlatformAuthStrategy, SoftwareHubCredentials, TokenCache,
};
pub use config::{AuthConfig, ExchangeSettings};
pub use error::{AuthError, MdmError};
pub use retry::{RetryExecutor, RetryPolicy};

pub mod prelude {
    pub use crate::adapter::MdmHttpAdapter;
    pub use crate::auth::{
        AuthenticationManager, CachedToken, CloudCredentials, CloudStrategy, Credentials, Crn,
        Platform, PlatformAuthStrategy, SoftwareHubCredentials, SoftwareHubStrategy, TokenCache,
    };
    pub use crate::config::{AuthConfig, ExchangeSettings};
    pub use crate::error::{AuthError, MdmError};
    pub use crate::http::build_http_client;
    pub use crate::retry::{RetryExecutor, RetryPolicy};
}
