use std::time::Duration;

use log::debug;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use reqwest::Client;

use crate::error::UploadError;

/// Create the HTTP client shared by one storage backend.
///
/// Redirects are disabled: a resumable session answers 308 to mean "continue",
/// which must reach the caller untouched.
pub fn create_http_client() -> Result<Client, UploadError> {
    let client = Client::builder()
        .redirect(Policy::none())
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| UploadError::Runtime(format!("Failed to create HTTP client: {}", e)))?;

    debug!("Created HTTP client");
    Ok(client)
}

/// First value of header `name` as a string, if present and valid UTF-8.
pub fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

/// Apply an optional timeout to a request.
pub fn with_timeout(
    request: reqwest::RequestBuilder,
    timeout: Option<Duration>,
) -> reqwest::RequestBuilder {
    match timeout {
        Some(timeout) => request.timeout(timeout),
        None => request,
    }
}
