//! HTTP client construction for the identity exchanges and the MDM services.

use reqwest::Client;

use crate::auth::Platform;
use crate::config::ExchangeSettings;
use crate::error::AuthError;

/// Build the client used for `platform`.
///
/// Certificate verification can only be relaxed for Software Hub; the cloud
/// IAM endpoint always uses public-trust TLS.
pub fn build_http_client(
    settings: &ExchangeSettings,
    platform: Platform,
) -> Result<Client, AuthError> {
    let mut builder = Client::builder().timeout(settings.timeout);

    if let Some(connect_timeout) = settings.connect_timeout {
        builder = builder.connect_timeout(connect_timeout);
    }
    if let Some(user_agent) = &settings.user_agent {
        builder = builder.user_agent(user_agent);
    }

    if settings.accept_invalid_certs {
        match platform {
            Platform::SoftwareHub => {
                tracing::warn!(
                    platform = %platform,
                    "TLS certificate verification is disabled"
                );
                builder = builder.danger_accept_invalid_certs(true);
            }
            Platform::Cloud => {
                tracing::warn!(
                    platform = %platform,
                    "ignoring request to disable TLS verification for the cloud platform"
                );
            }
        }
    }

    builder.build().map_err(|e| {
        AuthError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
    })
}
