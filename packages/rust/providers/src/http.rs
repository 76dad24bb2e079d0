//! HTTP plumbing shared by the provider adapters.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use pagekit_shared::{PagekitError, ProviderName, Result};

/// User-Agent string for provider requests.
pub(crate) const USER_AGENT: &str = concat!("pagekit/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout for search calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Build the HTTP client used by one adapter.
pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| PagekitError::Network(format!("failed to build HTTP client: {e}")))
}

/// Send `request` and decode a JSON body, mapping every failure to a
/// provider error.
pub(crate) async fn get_json<T: DeserializeOwned>(
    provider: ProviderName,
    request: RequestBuilder,
) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| PagekitError::provider(provider.as_str(), format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let reason = match status {
            StatusCode::TOO_MANY_REQUESTS => "rate limited",
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "credential rejected",
            _ => "unexpected status",
        };
        return Err(PagekitError::provider(
            provider.as_str(),
            format!("{reason} (HTTP {status})"),
        ));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| PagekitError::provider(provider.as_str(), format!("body read failed: {e}")))?;

    serde_json::from_slice(&body)
        .map_err(|e| PagekitError::provider(provider.as_str(), format!("malformed response: {e}")))
}

/// Strip a trailing slash so paths can be appended with `format!`.
pub(crate) fn trim_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
