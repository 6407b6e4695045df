//! Gateway discovery
//!
//! One HTTPS GET against the REST API returns the gateway's WebSocket
//! address. The result is cached for the life of the process; the fixed
//! encoding/version query parameters are appended once here.

use crate::protocol::gateway_query;
use parking_lot::Mutex;
use serde::Deserialize;

/// REST path that returns the gateway address
const GATEWAY_ENDPOINT: &str = "/gateway";

#[derive(Debug, Deserialize)]
struct GatewayInfo {
    url: String,
}

/// Resolves and caches the working gateway address
pub struct GatewayDiscovery {
    http: reqwest::Client,
    api_url: String,
    cached: Mutex<Option<String>>,
}

impl GatewayDiscovery {
    /// Create a resolver against the given REST base URL
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into(),
            cached: Mutex::new(None),
        }
    }

    /// Resolve the gateway address, reusing the cached result after the
    /// first success
    pub async fn gateway_url(&self) -> Result<String, reqwest::Error> {
        if let Some(url) = self.cached.lock().clone() {
            return Ok(url);
        }

        let info: GatewayInfo = self
            .http
            .get(format!("{}{GATEWAY_ENDPOINT}", self.api_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let url = format!("{}{}", info.url, gateway_query());
        tracing::info!(url = %url, "resolved gateway address");

        *self.cached.lock() = Some(url.clone());
        Ok(url)
    }
}
