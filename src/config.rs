//! Configuration for the proxy pool and the client.

use crate::error::ProxyParseError;
use crate::parser::ProxyApiResponse;
use crate::retry::RetryPolicy;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Strategy for selecting a proxy from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStrategy {
    /// Select a random live proxy.
    #[default]
    Random,
    /// Select proxies in round-robin fashion.
    RoundRobin,
}

/// Default mobile user agent.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 13; SM-G9980) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.5615.135 Mobile Safari/537.36";

/// Default Weibo mobile API host.
pub const DEFAULT_BASE_URL: &str = "https://m.weibo.cn";

/// Custom parser turning a proxy API response into a proxy URL.
pub type ProxyApiParser =
    Arc<dyn Fn(&ProxyApiResponse) -> Result<String, ProxyParseError> + Send + Sync>;

/// Configuration for the proxy pool.
#[derive(Clone)]
pub struct ProxyPoolConfig {
    /// Dynamic proxy API URL. `None` means the pool only holds manually added proxies.
    pub proxy_api_url: Option<String>,
    /// Parser used instead of [`default_api_parser`](crate::parser::default_api_parser).
    pub proxy_api_parser: Option<ProxyApiParser>,
    /// Lifetime of proxies fetched from the API.
    pub dynamic_proxy_ttl: Duration,
    /// Capacity the pool refills up to.
    pub pool_size: usize,
    /// Strategy for selecting proxies.
    pub fetch_strategy: FetchStrategy,
    /// Timeout for a single proxy API call.
    pub api_timeout: Duration,
}

impl ProxyPoolConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ProxyPoolConfigBuilder {
        ProxyPoolConfigBuilder::new()
    }
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        ProxyPoolConfigBuilder::new().build()
    }
}

impl fmt::Debug for ProxyPoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyPoolConfig")
            .field("proxy_api_url", &self.proxy_api_url)
            .field("custom_parser", &self.proxy_api_parser.is_some())
            .field("dynamic_proxy_ttl", &self.dynamic_proxy_ttl)
            .field("pool_size", &self.pool_size)
            .field("fetch_strategy", &self.fetch_strategy)
            .field("api_timeout", &self.api_timeout)
            .finish()
    }
}

/// Builder for `ProxyPoolConfig`.
pub struct ProxyPoolConfigBuilder {
    proxy_api_url: Option<String>,
    proxy_api_parser: Option<ProxyApiParser>,
    dynamic_proxy_ttl: Option<Duration>,
    pool_size: Option<usize>,
    fetch_strategy: Option<FetchStrategy>,
    api_timeout: Option<Duration>,
}

impl ProxyPoolConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            proxy_api_url: None,
            proxy_api_parser: None,
            dynamic_proxy_ttl: None,
            pool_size: None,
            fetch_strategy: None,
            api_timeout: None,
        }
    }

    /// Set the dynamic proxy API URL.
    pub fn proxy_api_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_api_url = Some(url.into());
        self
    }

    /// Replace the default API response parser.
    pub fn proxy_api_parser<F>(mut self, parser: F) -> Self
    where
        F: Fn(&ProxyApiResponse) -> Result<String, ProxyParseError> + Send + Sync + 'static,
    {
        self.proxy_api_parser = Some(Arc::new(parser));
        self
    }

    /// Set the lifetime of proxies fetched from the API.
    pub fn dynamic_proxy_ttl(mut self, ttl: Duration) -> Self {
        self.dynamic_proxy_ttl = Some(ttl);
        self
    }

    /// Set the pool capacity.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    /// Set the strategy for selecting proxies.
    pub fn fetch_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.fetch_strategy = Some(strategy);
        self
    }

    /// Set the timeout for proxy API calls.
    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = Some(timeout);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ProxyPoolConfig {
        ProxyPoolConfig {
            proxy_api_url: self.proxy_api_url,
            proxy_api_parser: self.proxy_api_parser,
            dynamic_proxy_ttl: self.dynamic_proxy_ttl.unwrap_or(Duration::from_secs(300)),
            pool_size: self.pool_size.unwrap_or(10),
            fetch_strategy: self.fetch_strategy.unwrap_or_default(),
            api_timeout: self.api_timeout.unwrap_or(Duration::from_secs(5)),
        }
    }
}

impl Default for ProxyPoolConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for [`WeiboClient`](crate::WeiboClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Cookie header value, normalized to `k=v; k2=v2`.
    pub cookies: Option<String>,
    /// User agent sent with every request.
    pub user_agent: String,
    /// API host the endpoint paths are joined to.
    pub base_url: String,
    /// Timeout of a single attempt.
    pub timeout: Duration,
    /// Attempts and backoff tiers.
    pub retry: RetryPolicy,
    /// Proxy pool settings.
    pub proxy_pool: ProxyPoolConfig,
    /// Draw a fresh proxy from the API for every attempt.
    pub use_once_proxy: bool,
    /// Upper bound on outgoing requests per second.
    pub requests_per_second: Option<f64>,
}

impl ClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfigBuilder::new().build()
    }
}

/// Builder for `ClientConfig`.
#[derive(Default)]
pub struct ClientConfigBuilder {
    cookies: Option<String>,
    user_agent: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    retry: Option<RetryPolicy>,
    proxy_pool: Option<ProxyPoolConfig>,
    use_once_proxy: bool,
    requests_per_second: Option<f64>,
}

impl ClientConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cookies from a `k=v; k2=v2` string.
    pub fn cookies(mut self, cookies: impl AsRef<str>) -> Self {
        let pairs = cookies.as_ref().split(';').filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        });
        self.cookies = join_cookies(pairs);
        self
    }

    /// Set cookies from name/value pairs.
    pub fn cookie_pairs<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.cookies = join_cookies(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the API host.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the timeout of a single attempt.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry policy.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Set the proxy pool configuration.
    pub fn proxy_pool(mut self, config: ProxyPoolConfig) -> Self {
        self.proxy_pool = Some(config);
        self
    }

    /// Use a fresh API proxy for every attempt instead of the pool.
    pub fn use_once_proxy(mut self, enabled: bool) -> Self {
        self.use_once_proxy = enabled;
        self
    }

    /// Limit outgoing requests per second.
    pub fn requests_per_second(mut self, rps: f64) -> Self {
        self.requests_per_second = Some(rps);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        ClientConfig {
            cookies: self.cookies,
            user_agent: self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            base_url: self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout: self.timeout.unwrap_or(Duration::from_secs(5)),
            retry: self.retry.unwrap_or_default(),
            proxy_pool: self.proxy_pool.unwrap_or_default(),
            use_once_proxy: self.use_once_proxy,
            requests_per_second: self.requests_per_second,
        }
    }
}

fn join_cookies(pairs: impl Iterator<Item = (String, String)>) -> Option<String> {
    let joined = pairs
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("; ");
    (!joined.is_empty()).then_some(joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProxyPoolConfig::default();
        assert!(config.proxy_api_url.is_none());
        assert!(config.proxy_api_parser.is_none());
        assert_eq!(config.dynamic_proxy_ttl, Duration::from_secs(300));
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.fetch_strategy, FetchStrategy::Random);
        assert_eq!(config.api_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_custom_config() {
        let config = ProxyPoolConfig::builder()
            .proxy_api_url("http://api.proxy.com/get")
            .dynamic_proxy_ttl(Duration::from_secs(600))
            .pool_size(20)
            .fetch_strategy(FetchStrategy::RoundRobin)
            .build();

        assert_eq!(config.proxy_api_url.as_deref(), Some("http://api.proxy.com/get"));
        assert_eq!(config.dynamic_proxy_ttl, Duration::from_secs(600));
        assert_eq!(config.pool_size, 20);
        assert_eq!(config.fetch_strategy, FetchStrategy::RoundRobin);
    }

    #[test]
    fn test_cookie_string_is_normalized() {
        let config = ClientConfig::builder()
            .cookies(" SUB=abc ; SUBP=def==;broken; =x")
            .build();
        assert_eq!(config.cookies.as_deref(), Some("SUB=abc; SUBP=def=="));

        let config = ClientConfig::builder().cookie_pairs([("SUB", "abc")]).build();
        assert_eq!(config.cookies.as_deref(), Some("SUB=abc"));

        let config = ClientConfig::builder().cookies("").build();
        assert!(config.cookies.is_none());
    }

    #[test]
    fn test_client_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_retries, 3);
        assert!(!config.use_once_proxy);
        assert!(config.requests_per_second.is_none());
    }

    #[test]
    fn test_debug_hides_parser_closure() {
        let config = ProxyPoolConfig::builder()
            .proxy_api_parser(|_| Ok("http://1.1.1.1:3128".to_string()))
            .build();
        let debug = format!("{config:?}");
        assert!(debug.contains("custom_parser: true"));
    }
}
