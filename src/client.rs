//! Weibo mobile API client.

use crate::config::ClientConfig;
use crate::error::CrawlError;
use crate::filters::UserFilter;
use crate::middleware::{BypassProxy, ProxyPoolMiddleware};
use crate::models::{self, Comment, CommentPage, Post, User};
use crate::pool::ProxyPool;

use governor::{
    clock::DefaultClock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use log::{info, warn};
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde_json::Value;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const CONTAINER_PATH: &str = "/api/container/getIndex";
const STATUS_PATH: &str = "/statuses/show";
const COMMENTS_PATH: &str = "/api/comments/show";

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Client for the Weibo mobile web API.
///
/// Every request goes through [`ProxyPoolMiddleware`], so blocked and failed
/// requests are retried and, when proxies are configured, each attempt leaves
/// through a proxy from the pool.
pub struct WeiboClient {
    http: ClientWithMiddleware,
    pool: Arc<ProxyPool>,
    base_url: Url,
    block_status: StatusCode,
    max_retries: usize,
    limiter: Option<Arc<DirectRateLimiter>>,
}

impl WeiboClient {
    /// Create a client from `config`.
    pub fn new(config: ClientConfig) -> Result<Self, CrawlError> {
        let headers = default_headers(&config)?;
        let base_url = Url::parse(&config.base_url)?;

        let pool = ProxyPool::new(config.proxy_pool.clone()).map_err(CrawlError::Client)?;
        let pool = Arc::new(pool);

        let inner = reqwest::Client::builder()
            .default_headers(headers.clone())
            .timeout(config.timeout)
            .build()
            .map_err(CrawlError::Client)?;

        let middleware = ProxyPoolMiddleware::new(Arc::clone(&pool), config.retry.clone())
            .with_use_once_proxy(config.use_once_proxy)
            .with_default_headers(headers)
            .with_timeout(config.timeout);

        let http = ClientBuilder::new(inner).with(middleware).build();

        let limiter = config.requests_per_second.map(|rps| {
            let per_second = NonZeroU32::new(rps.ceil() as u32).unwrap_or(NonZeroU32::MIN);
            Arc::new(RateLimiter::direct(Quota::per_second(per_second)))
        });

        info!("WeiboClient initialized successfully");

        Ok(Self {
            http,
            pool,
            base_url,
            block_status: config.retry.block_status,
            max_retries: config.retry.max_retries,
            limiter,
        })
    }

    /// Send a GET request and return the JSON body.
    ///
    /// Only HTTP 200 counts as success. With `use_proxy` set to false the
    /// request never touches the proxy pool.
    pub async fn request(
        &self,
        path: &str,
        params: &[(&str, String)],
        use_proxy: bool,
    ) -> Result<Value, CrawlError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let url = self.base_url.join(path)?;
        let mut builder = self.http.get(url).query(params);
        if !use_proxy {
            builder = builder.with_extension(BypassProxy);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::OK {
            response
                .json::<Value>()
                .await
                .map_err(|e| CrawlError::Parse(e.to_string()))
        } else if status == self.block_status {
            Err(CrawlError::Blocked {
                status,
                attempts: self.max_retries,
            })
        } else {
            Err(CrawlError::Http(status))
        }
    }

    /// Get a user's profile.
    pub async fn get_user_by_uid(&self, uid: &str, use_proxy: bool) -> Result<User, CrawlError> {
        let params = [("containerid", format!("100505{uid}"))];
        let data = self.request(CONTAINER_PATH, &params, use_proxy).await?;

        let user_info = data
            .pointer("/data/userInfo")
            .filter(|info| !info.is_null())
            .ok_or_else(|| CrawlError::UserNotFound(uid.to_string()))?;

        let user = User::from_value(user_info);
        info!("Fetched user: {}", user.screen_name);
        Ok(user)
    }

    /// Get one page of a user's posts, optionally expanding long posts to their full text.
    pub async fn get_user_posts(
        &self,
        uid: &str,
        page: u32,
        expand: bool,
        use_proxy: bool,
    ) -> Result<Vec<Post>, CrawlError> {
        let params = [
            ("containerid", format!("107603{uid}")),
            ("page", page.to_string()),
        ];
        let data = self.request(CONTAINER_PATH, &params, use_proxy).await?;

        if is_empty_data(&data) {
            return Ok(Vec::new());
        }

        let mut posts = models::posts_from_cards(&data);
        if expand {
            for post in posts.iter_mut().filter(|post| post.is_long_text) {
                match self.get_post_by_bid(&post.bid, use_proxy).await {
                    Ok(long_post) => {
                        post.text = long_post.text;
                        post.pic_urls = long_post.pic_urls;
                        post.video_url = long_post.video_url;
                    }
                    Err(e) => warn!("Failed to expand long post {}: {}", post.bid, e),
                }
            }
        }

        info!("Fetched {} posts", posts.len());
        Ok(posts)
    }

    /// Get a single post by its bid.
    pub async fn get_post_by_bid(&self, bid: &str, use_proxy: bool) -> Result<Post, CrawlError> {
        let params = [("id", bid.to_string())];
        let data = self.request(STATUS_PATH, &params, use_proxy).await?;

        match data.get("data") {
            Some(mblog) if mblog.is_object() && !is_empty_data(&data) => {
                Ok(Post::from_value(mblog))
            }
            _ => Err(CrawlError::Parse(format!("post {bid} not found"))),
        }
    }

    /// Search users by keyword.
    pub async fn search_users(
        &self,
        query: &str,
        page: u32,
        count: u32,
        use_proxy: bool,
    ) -> Result<Vec<User>, CrawlError> {
        let params = [
            ("containerid", format!("100103type=3&q={query}")),
            ("page", page.to_string()),
            ("count", count.to_string()),
        ];
        let data = self.request(CONTAINER_PATH, &params, use_proxy).await?;
        let users = models::users_from_search_cards(&data);

        info!("Found {} users", users.len());
        Ok(users)
    }

    /// Search users by keyword and keep only those matching `filter`.
    ///
    /// Filtering happens on the fetched page, so a page may come back with
    /// fewer than `count` users.
    pub async fn search_users_filtered(
        &self,
        query: &str,
        page: u32,
        count: u32,
        filter: &UserFilter,
        use_proxy: bool,
    ) -> Result<Vec<User>, CrawlError> {
        let users = self.search_users(query, page, count, use_proxy).await?;
        if filter.is_empty() {
            return Ok(users);
        }

        let found = users.len();
        let users = filter.apply(users);
        info!("{} of {} users matched the filter", users.len(), found);
        Ok(users)
    }

    /// Search posts by keyword.
    pub async fn search_posts(
        &self,
        query: &str,
        page: u32,
        use_proxy: bool,
    ) -> Result<Vec<Post>, CrawlError> {
        let params = [
            ("containerid", format!("100103type=1&q={query}")),
            ("page", page.to_string()),
        ];
        let data = self.request(CONTAINER_PATH, &params, use_proxy).await?;
        let posts = models::posts_from_cards(&data);

        info!("Found {} posts", posts.len());
        Ok(posts)
    }

    /// Get one page of comments on a post.
    ///
    /// A post without comments yields an empty page rather than an error.
    pub async fn get_comments(
        &self,
        post_id: &str,
        page: u32,
        use_proxy: bool,
    ) -> Result<CommentPage, CrawlError> {
        let params = [("id", post_id.to_string()), ("page", page.to_string())];
        let data = self.request(COMMENTS_PATH, &params, use_proxy).await?;

        if is_empty_data(&data) {
            return Ok(CommentPage::default());
        }

        let comments = CommentPage::from_response(&data);
        info!("Fetched {} comments on page {}", comments.comments.len(), page);
        Ok(comments)
    }

    /// Get every comment on a post, page by page.
    ///
    /// Stops at the last page reported by the API, at the first empty page, or
    /// after `max_pages` pages.
    pub async fn get_all_comments(
        &self,
        post_id: &str,
        max_pages: Option<u32>,
        use_proxy: bool,
    ) -> Result<Vec<Comment>, CrawlError> {
        let mut comments = Vec::new();
        let mut page = 1;

        while max_pages.map_or(true, |max| page <= max) {
            let batch = self.get_comments(post_id, page, use_proxy).await?;
            if batch.comments.is_empty() {
                break;
            }
            comments.extend(batch.comments);
            if batch.max_page != 0 && page >= batch.max_page {
                break;
            }
            page += 1;
        }

        info!("Fetched {} comments on post {} in total", comments.len(), post_id);
        Ok(comments)
    }

    /// Add a proxy to the pool. Without a TTL the proxy never expires.
    pub fn add_proxy(&self, url: impl Into<String>, ttl: Option<Duration>) {
        let url = url.into();
        match ttl {
            Some(ttl) => info!("Added proxy to pool: {}, TTL: {:?}", url, ttl),
            None => info!("Added proxy to pool: {}, TTL: never expires", url),
        }
        self.pool.add_proxy(url, ttl);
    }

    /// Number of live proxies in the pool.
    pub fn get_proxy_pool_size(&self) -> usize {
        self.pool.get_pool_size()
    }

    /// Capacity of the pool.
    pub fn get_proxy_pool_capacity(&self) -> usize {
        self.pool.get_pool_capacity()
    }

    /// Remove every proxy from the pool.
    pub fn clear_proxy_pool(&self) {
        self.pool.clear_pool();
        info!("Proxy pool cleared");
    }

    /// The underlying proxy pool.
    pub fn proxy_pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }
}

fn default_headers(config: &ClientConfig) -> Result<HeaderMap, CrawlError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        HeaderValue::from_str(&config.user_agent)
            .map_err(|_| CrawlError::InvalidHeader("User-Agent"))?,
    );
    headers.insert(header::REFERER, HeaderValue::from_static("https://m.weibo.cn/"));
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(
        HeaderName::from_static("x-requested-with"),
        HeaderValue::from_static("XMLHttpRequest"),
    );

    if let Some(cookies) = &config.cookies {
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(cookies).map_err(|_| CrawlError::InvalidHeader("Cookie"))?,
        );
    }

    Ok(headers)
}

fn is_empty_data(data: &Value) -> bool {
    match data.get("data") {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}
