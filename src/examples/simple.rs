//! Simple example of using weibo-proxy-pool.

use std::time::Duration;
use weibo_proxy_pool::{ClientConfig, FetchStrategy, ProxyPoolConfig, WeiboClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut pool_config = ProxyPoolConfig::builder()
        .pool_size(5)
        .dynamic_proxy_ttl(Duration::from_secs(300))
        .fetch_strategy(FetchStrategy::RoundRobin);
    // vendor endpoint returning one proxy per call,
    // e.g. `1.2.3.4:8080` or `{"ip": ..., "port": ...}`
    if let Ok(api_url) = std::env::var("PROXY_API_URL") {
        pool_config = pool_config.proxy_api_url(api_url);
    }

    let mut config = ClientConfig::builder()
        .proxy_pool(pool_config.build())
        .requests_per_second(1.0);
    if let Ok(cookies) = std::env::var("WEIBO_COOKIES") {
        config = config.cookies(cookies);
    }

    let client = WeiboClient::new(config.build())?;

    let uid = "2656274875";
    let user = client.get_user_by_uid(uid, true).await?;
    println!("Username: {}", user.screen_name);
    println!("Followers: {}", user.followers_count);

    let posts = client.get_user_posts(uid, 1, true, true).await?;
    println!("Retrieved {} posts", posts.len());
    for (i, post) in posts.iter().take(3).enumerate() {
        let preview: String = post.text.chars().take(50).collect();
        println!("  {}. {}...", i + 1, preview);
        println!("     Likes: {} | Comments: {}", post.attitudes_count, post.comments_count);
    }

    let users = client.search_users("新浪", 1, 10, true).await?;
    for user in users {
        println!("  - {} (Followers: {})", user.screen_name, user.followers_count);
    }

    println!(
        "Proxy pool size: {}/{}",
        client.get_proxy_pool_size(),
        client.get_proxy_pool_capacity()
    );

    Ok(())
}
