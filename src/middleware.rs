//! Middleware implementation for reqwest.

use crate::error::RetriesExhausted;
use crate::pool::ProxyPool;
use crate::proxy::ProxyDescriptor;
use crate::retry::{ProxyMode, RetryPolicy, Retryable};

use anyhow::anyhow;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::HeaderMap;
use reqwest_middleware::{Error, Middleware, Next, Result};
use std::sync::Arc;
use std::time::Duration;

/// Request extension that sends a single request without any proxy.
///
/// ```ignore
/// client.get(url).with_extension(BypassProxy).send().await?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BypassProxy;

/// Middleware that retries blocked and failed requests, routing each attempt
/// through a proxy from the pool.
///
/// Statuses other than the block status are returned as-is and never retried.
#[derive(Clone)]
pub struct ProxyPoolMiddleware {
    /// The proxy pool.
    pool: Arc<ProxyPool>,
    /// Attempts and backoff tiers.
    policy: RetryPolicy,
    /// Draw a fresh proxy from the API for every attempt.
    use_once_proxy: bool,
    /// Headers copied onto the per-attempt proxied clients.
    default_headers: HeaderMap,
    /// Timeout of a proxied attempt.
    timeout: Duration,
}

impl ProxyPoolMiddleware {
    /// Create a new middleware drawing proxies from `pool`.
    pub fn new(pool: Arc<ProxyPool>, policy: RetryPolicy) -> Self {
        Self {
            pool,
            policy,
            use_once_proxy: false,
            default_headers: HeaderMap::new(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Use a fresh proxy from the API for every attempt instead of the pool.
    pub fn with_use_once_proxy(mut self, enabled: bool) -> Self {
        self.use_once_proxy = enabled;
        self
    }

    /// Headers sent with proxied attempts, which bypass the inner client.
    pub fn with_default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = headers;
        self
    }

    /// Timeout of a proxied attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The pool this middleware draws from.
    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    async fn acquire_proxy(&self, bypass: bool) -> (ProxyMode, Option<ProxyDescriptor>) {
        if bypass {
            return (ProxyMode::Direct, None);
        }

        if self.use_once_proxy && self.pool.config.proxy_api_url.is_some() {
            return match self.pool.fetch_once_proxy().await {
                Some(proxy) => (ProxyMode::Once, Some(proxy)),
                None => {
                    warn!("Failed to fetch a one-time proxy, request will proceed without proxy");
                    (ProxyMode::Direct, None)
                }
            };
        }

        if !self.pool.is_enabled() {
            return (ProxyMode::Direct, None);
        }

        match self.pool.get_proxy().await {
            Some(proxy) => (ProxyMode::Pooled, Some(proxy)),
            None => {
                warn!(
                    "Proxy pool failed to get available proxy, request will proceed without proxy"
                );
                (ProxyMode::Direct, None)
            }
        }
    }

    async fn execute_proxied(
        &self,
        proxy: &ProxyDescriptor,
        req: reqwest::Request,
    ) -> std::result::Result<reqwest::Response, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .default_headers(self.default_headers.clone())
            .timeout(self.timeout);
        for reqwest_proxy in proxy.to_reqwest_proxies()? {
            builder = builder.proxy(reqwest_proxy);
        }
        builder.build()?.execute(req).await
    }
}

#[async_trait]
impl Middleware for ProxyPoolMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<reqwest::Response> {
        let bypass = extensions.get::<BypassProxy>().is_some();
        let max_retries = self.policy.max_retries;

        for attempt in 1..=max_retries {
            let attempt_req = req.try_clone().ok_or_else(|| {
                Error::Middleware(anyhow!(
                    "Request object is not cloneable. Are you passing a streaming body?"
                ))
            })?;

            let (mode, proxy) = self.acquire_proxy(bypass).await;
            let result = match &proxy {
                Some(proxy) => {
                    debug!("Using proxy: {} (attempt {})", proxy.http, attempt);
                    self.execute_proxied(proxy, attempt_req)
                        .await
                        .map_err(Error::Reqwest)
                }
                None => next.clone().run(attempt_req, extensions).await,
            };

            let (outcome, last) = match result {
                Ok(response) if response.status() == self.policy.block_status => {
                    (Retryable::Blocked, Ok(response))
                }
                Ok(response) => return Ok(response),
                Err(Error::Reqwest(err)) => (Retryable::Transient, Err(Error::Reqwest(err))),
                Err(err) => return Err(err),
            };

            if attempt == max_retries {
                return last;
            }

            let delay = self.policy.backoff(mode, outcome);
            match &last {
                Ok(response) => warn!(
                    "Encountered {} error via {:?} (attempt {}), waiting {:.1} seconds before retry",
                    response.status().as_u16(),
                    mode,
                    attempt,
                    delay.as_secs_f64()
                ),
                Err(err) => warn!(
                    "Request failed via {:?} (attempt {}), waiting {:.1} seconds before retry: {}",
                    mode,
                    attempt,
                    delay.as_secs_f64(),
                    err
                ),
            }
            drop(last);

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        Err(Error::Middleware(anyhow!(RetriesExhausted)))
    }
}
