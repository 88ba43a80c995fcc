//! # weibo-proxy-pool
//!
//! A Weibo mobile API client with a rotating proxy pool.
//!
//! This library provides a client for the Weibo mobile web API whose requests go
//! through a reqwest middleware that retries anti-scraping blocks and transport
//! failures, routing each attempt through a proxy from a TTL-bounded pool that
//! refills itself from a proxy vending API.

pub mod client;
pub mod config;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod parser;
pub mod pool;
pub mod proxy;
pub mod retry;
mod utils;

pub use client::WeiboClient;
pub use config::{
    ClientConfig, ClientConfigBuilder, FetchStrategy, ProxyApiParser, ProxyPoolConfig,
    ProxyPoolConfigBuilder,
};
pub use error::{CrawlError, FilterError, ProxyParseError, RetriesExhausted};
pub use filters::UserFilter;
pub use middleware::{BypassProxy, ProxyPoolMiddleware};
pub use models::{Comment, CommentPage, Post, User};
pub use parser::{default_api_parser, ProxyApiResponse};
pub use pool::ProxyPool;
pub use proxy::{ProxyDescriptor, ProxyEntry};
pub use retry::{ProxyMode, RetryPolicy, Retryable};
