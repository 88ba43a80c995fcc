//! Utility functions for the proxy pool.

use crate::config::ProxyPoolConfig;
use crate::parser::{default_api_parser, ProxyApiResponse};

use log::warn;
use reqwest::Client;

/// Fetch one proxy URL from the configured proxy API.
///
/// Every failure (network, HTTP status, parse) is logged and turned into `None`.
pub(crate) async fn fetch_proxy_from_api(
    client: &Client,
    config: &ProxyPoolConfig,
) -> Option<String> {
    let api_url = config.proxy_api_url.as_deref()?;

    let response = match client.get(api_url).send().await.and_then(|r| r.error_for_status()) {
        Ok(response) => response,
        Err(e) => {
            warn!("Proxy API request to {} failed: {}", api_url, e);
            return None;
        }
    };

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to read proxy API response from {}: {}", api_url, e);
            return None;
        }
    };

    let payload = ProxyApiResponse::from_body(body);
    let parsed = match &config.proxy_api_parser {
        Some(parser) => parser(&payload),
        None => default_api_parser(&payload),
    };

    match parsed {
        Ok(url) => Some(url),
        Err(e) => {
            warn!("Failed to parse proxy API response from {}: {}", api_url, e);
            None
        }
    }
}
