//! Core proxy pool implementation.

use crate::config::{FetchStrategy, ProxyPoolConfig};
use crate::proxy::{ProxyDescriptor, ProxyEntry};
use crate::utils;

use log::{debug, info};
use parking_lot::Mutex;
use rand::Rng;
use reqwest::Client;
use std::time::Duration;
use tokio::time::Instant;

/// Entries and round-robin cursor, always mutated together.
#[derive(Debug, Default)]
struct PoolState {
    entries: Vec<ProxyEntry>,
    current_index: usize,
}

impl PoolState {
    fn sweep(&mut self, now: Instant) {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.is_live(now));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Removed {} expired proxies from pool", removed);
        }
    }

    fn select(&mut self, strategy: FetchStrategy) -> Option<&ProxyEntry> {
        let len = self.entries.len();
        if len == 0 {
            return None;
        }

        let index = match strategy {
            FetchStrategy::Random => rand::rng().random_range(0..len),
            FetchStrategy::RoundRobin => {
                // The cursor is a plain index, so removals may shift which entry it names.
                let index = self.current_index % len;
                self.current_index = (index + 1) % len;
                index
            }
        };

        self.entries.get(index)
    }
}

/// A pool of static and dynamically fetched proxies with individual expiry.
///
/// The pool is safe to share between tasks. Its lock is never held while the
/// proxy API is being called.
pub struct ProxyPool {
    /// Live entries and the round-robin cursor.
    state: Mutex<PoolState>,
    /// Configuration for the pool.
    pub config: ProxyPoolConfig,
    /// Client used for proxy API calls.
    api_client: Client,
}

impl ProxyPool {
    /// Create a new, empty proxy pool with the given configuration.
    pub fn new(config: ProxyPoolConfig) -> Result<Self, reqwest::Error> {
        let api_client = Client::builder().timeout(config.api_timeout).build()?;

        if let Some(api_url) = &config.proxy_api_url {
            info!(
                "Proxy pool enabled (API: {}, capacity: {}, TTL: {:?}, strategy: {:?})",
                api_url, config.pool_size, config.dynamic_proxy_ttl, config.fetch_strategy
            );
        }

        Ok(Self {
            state: Mutex::new(PoolState::default()),
            config,
            api_client,
        })
    }

    /// Add a proxy to the pool. Without a TTL the proxy never expires.
    ///
    /// Capacity is not checked here, only before refilling from the API.
    pub fn add_proxy(&self, url: impl Into<String>, ttl: Option<Duration>) {
        let entry = ProxyEntry::new(url, ttl, Instant::now());
        self.state.lock().entries.push(entry);
    }

    /// Get a proxy according to the configured strategy.
    ///
    /// Expired proxies are dropped first. While the pool is below capacity one
    /// proxy is fetched from the API; a failed fetch just leaves the pool as it
    /// is. Expiry is only checked before the refill, so a freshly fetched proxy
    /// can be handed out even when its TTL is shorter than the fetch took.
    /// Returns `None` when the pool ends up empty.
    pub async fn get_proxy(&self) -> Option<ProxyDescriptor> {
        let needs_refill = {
            let mut state = self.state.lock();
            state.sweep(Instant::now());
            state.entries.len() < self.config.pool_size
        };

        let fetched = if needs_refill {
            utils::fetch_proxy_from_api(&self.api_client, &self.config).await
        } else {
            None
        };

        let mut state = self.state.lock();
        let now = Instant::now();
        if let Some(url) = fetched {
            debug!("Fetched proxy {} from API", url);
            state
                .entries
                .push(ProxyEntry::new(url, Some(self.config.dynamic_proxy_ttl), now));
        }

        let selected = state
            .select(self.config.fetch_strategy)
            .map(|entry| ProxyDescriptor::new(entry.url.clone()));
        selected
    }

    /// Fetch a fresh proxy from the API without storing it in the pool.
    pub async fn fetch_once_proxy(&self) -> Option<ProxyDescriptor> {
        utils::fetch_proxy_from_api(&self.api_client, &self.config)
            .await
            .map(ProxyDescriptor::new)
    }

    /// Whether the pool can hand out proxies: an API is configured or live proxies remain.
    pub fn is_enabled(&self) -> bool {
        if self.config.proxy_api_url.is_some() {
            return true;
        }
        let mut state = self.state.lock();
        state.sweep(Instant::now());
        !state.entries.is_empty()
    }

    /// Number of live proxies in the pool.
    pub fn get_pool_size(&self) -> usize {
        let mut state = self.state.lock();
        state.sweep(Instant::now());
        state.entries.len()
    }

    /// Maximum number of proxies the pool refills up to.
    pub fn get_pool_capacity(&self) -> usize {
        self.config.pool_size
    }

    /// Remove every proxy and reset the round-robin cursor.
    pub fn clear_pool(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.current_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_pool(strategy: FetchStrategy) -> ProxyPool {
        let config = ProxyPoolConfig::builder().fetch_strategy(strategy).build();
        ProxyPool::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_add_static_proxy_without_ttl() {
        let pool = static_pool(FetchStrategy::Random);
        pool.add_proxy("http://1.2.3.4:8080", None);

        assert_eq!(pool.get_pool_size(), 1);
        let proxy = pool.get_proxy().await.unwrap();
        assert_eq!(proxy.http, "http://1.2.3.4:8080");
        assert_eq!(proxy.https, "http://1.2.3.4:8080");
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_static_proxy_with_ttl() {
        let pool = static_pool(FetchStrategy::Random);
        pool.add_proxy("http://1.2.3.4:8080", Some(Duration::from_secs(1)));

        assert_eq!(pool.get_pool_size(), 1);
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(pool.get_pool_size(), 0);
        assert!(pool.get_proxy().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_expired_proxies_keeps_permanent_ones() {
        let pool = static_pool(FetchStrategy::RoundRobin);
        pool.add_proxy("http://1.2.3.4:8080", Some(Duration::from_secs(1)));
        pool.add_proxy("http://5.6.7.8:8080", None);

        assert_eq!(pool.get_pool_size(), 2);
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(pool.get_pool_size(), 1);

        for _ in 0..3 {
            assert_eq!(pool.get_proxy().await.unwrap().http, "http://5.6.7.8:8080");
        }
    }

    #[tokio::test]
    async fn test_round_robin_rotation() {
        let pool = static_pool(FetchStrategy::RoundRobin);
        pool.add_proxy("http://1.2.3.4:8080", None);
        pool.add_proxy("http://5.6.7.8:8080", None);

        assert_eq!(pool.get_proxy().await.unwrap().http, "http://1.2.3.4:8080");
        assert_eq!(pool.get_proxy().await.unwrap().http, "http://5.6.7.8:8080");
        assert_eq!(pool.get_proxy().await.unwrap().http, "http://1.2.3.4:8080");
    }

    #[tokio::test]
    async fn test_round_robin_visits_every_entry_once_per_cycle() {
        let pool = static_pool(FetchStrategy::RoundRobin);
        let urls: Vec<String> = (1..=5).map(|i| format!("http://10.0.0.{i}:8080")).collect();
        for url in &urls {
            pool.add_proxy(url.clone(), None);
        }

        for _ in 0..3 {
            let mut cycle = Vec::new();
            for _ in 0..urls.len() {
                cycle.push(pool.get_proxy().await.unwrap().http);
            }
            assert_eq!(cycle, urls);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_round_robin_cursor_is_a_plain_index() {
        let pool = static_pool(FetchStrategy::RoundRobin);
        pool.add_proxy("http://1.1.1.1:1", Some(Duration::from_secs(1)));
        pool.add_proxy("http://2.2.2.2:2", None);
        pool.add_proxy("http://3.3.3.3:3", None);
        assert_eq!(pool.get_proxy().await.unwrap().http, "http://1.1.1.1:1");

        tokio::time::advance(Duration::from_secs(2)).await;

        // Cursor still points at index 1, which is now the third proxy.
        assert_eq!(pool.get_proxy().await.unwrap().http, "http://3.3.3.3:3");
        assert_eq!(pool.get_proxy().await.unwrap().http, "http://2.2.2.2:2");
    }

    #[tokio::test]
    async fn test_random_selection_stays_within_pool() {
        let pool = static_pool(FetchStrategy::Random);
        pool.add_proxy("http://1.2.3.4:8080", None);
        pool.add_proxy("http://5.6.7.8:8080", None);

        for _ in 0..20 {
            let proxy = pool.get_proxy().await.unwrap();
            assert!(["http://1.2.3.4:8080", "http://5.6.7.8:8080"].contains(&proxy.http.as_str()));
        }
    }

    #[tokio::test]
    async fn test_clear_pool_resets_cursor() {
        let pool = static_pool(FetchStrategy::RoundRobin);
        pool.add_proxy("http://1.2.3.4:8080", None);
        pool.add_proxy("http://5.6.7.8:8080", None);
        pool.add_proxy("http://9.10.11.12:8080", None);
        pool.get_proxy().await.unwrap();
        pool.get_proxy().await.unwrap();

        pool.clear_pool();
        assert_eq!(pool.get_pool_size(), 0);

        pool.add_proxy("http://1.2.3.4:8080", None);
        pool.add_proxy("http://5.6.7.8:8080", None);
        assert_eq!(pool.get_proxy().await.unwrap().http, "http://1.2.3.4:8080");
    }

    #[test]
    fn test_pool_capacity() {
        let config = ProxyPoolConfig::builder().pool_size(3).build();
        let pool = ProxyPool::new(config).unwrap();
        assert_eq!(pool.get_pool_capacity(), 3);
    }

    #[test]
    fn test_manual_add_may_exceed_capacity() {
        let config = ProxyPoolConfig::builder().pool_size(1).build();
        let pool = ProxyPool::new(config).unwrap();
        pool.add_proxy("http://1.2.3.4:8080", None);
        pool.add_proxy("http://5.6.7.8:8080", None);
        assert_eq!(pool.get_pool_size(), 2);
    }

    #[test]
    fn test_is_enabled() {
        let with_api = ProxyPool::new(
            ProxyPoolConfig::builder()
                .proxy_api_url("http://api.proxy.com/get")
                .build(),
        )
        .unwrap();
        assert!(with_api.is_enabled());

        let static_only = ProxyPool::new(ProxyPoolConfig::default()).unwrap();
        assert!(!static_only.is_enabled());
        static_only.add_proxy("http://1.2.3.4:8080", None);
        assert!(static_only.is_enabled());
    }

    #[tokio::test]
    async fn test_empty_pool_without_api_returns_none() {
        let pool = static_pool(FetchStrategy::Random);
        assert!(pool.get_proxy().await.is_none());
        assert!(pool.fetch_once_proxy().await.is_none());
    }
}
