// # Audiobookshelf Transport
//
// This crate provides the HTTP implementation of shelfsync's RemoteCatalog
// trait for an Audiobookshelf server.
//
// ## Behaviour
//
// - One HTTP request per trait call, no retries, no caching
// - Bounded request timeout (20 seconds)
// - Every failure (connection, HTTP status, undecodable body) maps to
//   `Error::Fetch` with a status-specific message
//
// ## Security Requirements
//
// - API key NEVER appears in logs or Debug output
// - Client construction fails fast if the key is empty
//
// ## API Reference
//
// - List library items: GET `/api/libraries/:library_id/items`
// - Current user (progress, bookmarks): GET `/api/me`
// - Liveness: GET `/ping`

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use shelfsync_core::config::ConnectionConfig;
use shelfsync_core::traits::RemoteCatalog;
use shelfsync_core::{Error, Result};
use std::time::Duration;

/// Default HTTP timeout for API requests (20 seconds)
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Audiobookshelf REST client
///
/// # Security
///
/// The Debug implementation intentionally does NOT expose the API key.
pub struct AudiobookshelfClient {
    connection: ConnectionConfig,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the API key
impl std::fmt::Debug for AudiobookshelfClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudiobookshelfClient")
            .field("base_url", &self.connection.base_url)
            .field("library_id", &self.connection.library_id)
            .field("api_key", &"<REDACTED>")
            .finish()
    }
}

impl AudiobookshelfClient {
    /// Create a client with the default timeout
    pub fn new(connection: ConnectionConfig) -> Result<Self> {
        Self::with_timeout(connection, DEFAULT_HTTP_TIMEOUT)
    }

    /// Create a client with an explicit request timeout
    ///
    /// # Errors
    ///
    /// `Error::Config` if the key or library id is empty, or if the HTTP
    /// client cannot be built.
    pub fn with_timeout(connection: ConnectionConfig, timeout: Duration) -> Result<Self> {
        connection.validate()?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { connection, client })
    }

    /// Perform one authenticated GET and decode the JSON body
    async fn get_json(&self, what: &str, url: &str) -> Result<Value> {
        tracing::debug!("Requesting {} from {}", what, url);

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.connection.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| Error::fetch(format!("Failed to retrieve {}: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(status_error(what, status, &body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| Error::fetch(format!("Failed to parse {}: {}", what, e)))
    }
}

/// Map a non-success HTTP status to a fetch error
fn status_error(what: &str, status: StatusCode, body: &str) -> Error {
    match status.as_u16() {
        401 | 403 => Error::fetch(format!(
            "Authentication failed retrieving {}: invalid API key or insufficient permissions. Status: {}",
            what, status
        )),
        404 => Error::fetch(format!(
            "Not found retrieving {}: check the server URL and library ID. Status: {}",
            what, status
        )),
        429 => Error::fetch(format!(
            "Rate limit exceeded retrieving {}. Please retry later. Status: {}",
            what, status
        )),
        500..=599 => Error::fetch(format!(
            "Audiobookshelf server error retrieving {}: {} - {}",
            what, status, body
        )),
        _ => Error::fetch(format!(
            "API request for {} failed: {} - {}",
            what, status, body
        )),
    }
}

#[async_trait]
impl RemoteCatalog for AudiobookshelfClient {
    async fn list_library_items(&self) -> Result<Value> {
        let items = self
            .get_json("library items", &self.connection.library_items_url())
            .await?;
        tracing::debug!("Library items retrieved");
        Ok(items)
    }

    async fn get_profile(&self) -> Result<Value> {
        let me = self.get_json("user profile", &self.connection.me_url()).await?;
        tracing::debug!("User profile retrieved");
        Ok(me)
    }

    async fn ping(&self) -> Result<()> {
        let url = self.connection.ping_url();
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::fetch(format!("Server unreachable at {}: {}", url, e)))?;

        let status = response.status();
        if status.is_success() {
            tracing::info!("Audiobookshelf server reachable at {}", self.connection.base_url);
            Ok(())
        } else {
            Err(status_error("ping", status, ""))
        }
    }

    fn name(&self) -> &'static str {
        "audiobookshelf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(api_key: &str) -> ConnectionConfig {
        ConnectionConfig::new("http://127.0.0.1:9", "lib_main", api_key)
    }

    #[test]
    fn test_empty_key_rejected() {
        let result = AudiobookshelfClient::new(connection(""));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_library_rejected() {
        let result =
            AudiobookshelfClient::new(ConnectionConfig::new("http://127.0.0.1:9", "", "key"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_client_name() {
        let client = AudiobookshelfClient::new(connection("key")).unwrap();
        assert_eq!(client.name(), "audiobookshelf");
    }

    #[test]
    fn test_api_key_not_exposed_in_debug() {
        let client = AudiobookshelfClient::new(connection("secret_key_12345")).unwrap();

        let debug_str = format!("{:?}", client);
        assert!(!debug_str.contains("secret_key_12345"));
        assert!(debug_str.contains("AudiobookshelfClient"));
        assert!(debug_str.contains("lib_main"));
    }

    #[test]
    fn test_status_mapping() {
        let auth = status_error("library items", StatusCode::UNAUTHORIZED, "");
        assert!(matches!(&auth, Error::Fetch(msg) if msg.contains("Authentication failed")));

        let missing = status_error("library items", StatusCode::NOT_FOUND, "");
        assert!(matches!(&missing, Error::Fetch(msg) if msg.contains("library ID")));

        let limited = status_error("user profile", StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(&limited, Error::Fetch(msg) if msg.contains("Rate limit")));

        let server = status_error("user profile", StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(&server, Error::Fetch(msg) if msg.contains("upstream down")));

        let other = status_error("user profile", StatusCode::IM_A_TEAPOT, "nope");
        assert!(other.is_fatal());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_fetch_error() {
        let client =
            AudiobookshelfClient::with_timeout(connection("key"), Duration::from_secs(2)).unwrap();

        assert!(matches!(client.list_library_items().await, Err(Error::Fetch(_))));
        assert!(matches!(client.ping().await, Err(Error::Fetch(_))));
    }
}
