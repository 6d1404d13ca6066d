//! Shared HTTP client construction.

use std::time::Duration;

/// User agent sent with every outbound request.
pub const USER_AGENT: &str = concat!("fiddle-bisect/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client used by the release, template and gist sources.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(15))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        })
}
