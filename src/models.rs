//! Typed records extracted from Weibo API responses.
//!
//! Missing or oddly typed fields fall back to defaults. The raw JSON is kept
//! for anything not mapped.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::LazyLock;

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("line break pattern is valid"));
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));

/// A Weibo user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct User {
    /// Numeric user id, as a string.
    pub id: String,
    /// Display name.
    pub screen_name: String,
    /// `m`, `f`, or empty when unknown.
    pub gender: String,
    /// Location as shown on the profile.
    pub location: String,
    /// Profile description.
    pub description: String,
    /// Number of followers.
    pub followers_count: u64,
    /// Number of accounts this user follows.
    pub following_count: u64,
    /// Number of posts.
    pub posts_count: u64,
    /// Whether the account is verified.
    pub verified: bool,
    /// Reason given for verification.
    pub verified_reason: String,
    /// Avatar image URL.
    pub avatar_url: String,
    /// Birthday text, e.g. `1995-02-03`. Often only a month and day.
    pub birthday: String,
    /// School, when the profile lists one.
    pub education: String,
    /// Employer, when the profile lists one.
    pub company: String,
    /// The object this user was built from.
    #[serde(skip)]
    pub raw: Value,
}

impl User {
    /// Build a user from a `userInfo` or search-card `user` object.
    pub fn from_value(data: &Value) -> Self {
        Self {
            id: string_field(data, &["id"]),
            screen_name: string_field(data, &["screen_name"]),
            gender: string_field(data, &["gender"]),
            location: string_field(data, &["location", "ip_location", "region_name"]),
            description: string_field(data, &["description"]),
            followers_count: count_field(data, &["followers_count"]),
            following_count: count_field(data, &["follow_count", "friends_count"]),
            posts_count: count_field(data, &["statuses_count"]),
            verified: data.get("verified").and_then(Value::as_bool).unwrap_or(false),
            verified_reason: string_field(data, &["verified_reason"]),
            avatar_url: string_field(data, &["avatar_hd", "profile_image_url"]),
            birthday: string_field(data, &["birthday", "birthday_text"]),
            education: string_field(data, &["education", "education_background"]),
            company: string_field(data, &["company", "company_name"]),
            raw: data.clone(),
        }
    }
}

/// A Weibo post.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Post {
    /// Numeric post id (`mid`).
    pub id: String,
    /// Short base62 id used in post URLs.
    pub bid: String,
    /// Id of the author.
    pub user_id: String,
    /// Text with markup removed.
    pub text: String,
    /// Creation time as reported by the API.
    pub created_at: String,
    /// Client the post was sent from.
    pub source: String,
    /// Number of reposts.
    pub reposts_count: u64,
    /// Number of comments.
    pub comments_count: u64,
    /// Number of likes.
    pub attitudes_count: u64,
    /// Whether `text` is truncated and the full text needs another request.
    pub is_long_text: bool,
    /// Image URLs, large variants when available.
    pub pic_urls: Vec<String>,
    /// Video stream URL, HD when available.
    pub video_url: Option<String>,
    /// The `mblog` object this post was built from.
    #[serde(skip)]
    pub raw: Value,
}

impl Post {
    /// Build a post from an `mblog` object.
    pub fn from_value(mblog: &Value) -> Self {
        let pic_urls = mblog
            .get("pics")
            .and_then(Value::as_array)
            .map(|pics| {
                pics.iter()
                    .filter_map(|pic| {
                        pic.pointer("/large/url")
                            .or_else(|| pic.get("url"))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let video_url = mblog
            .pointer("/page_info/media_info/stream_url_hd")
            .or_else(|| mblog.pointer("/page_info/media_info/stream_url"))
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string);

        Self {
            id: string_field(mblog, &["id"]),
            bid: string_field(mblog, &["bid"]),
            user_id: mblog
                .get("user")
                .map(|user| string_field(user, &["id"]))
                .unwrap_or_default(),
            text: strip_tags(&string_field(mblog, &["text"])),
            created_at: string_field(mblog, &["created_at"]),
            source: string_field(mblog, &["source"]),
            reposts_count: count_field(mblog, &["reposts_count"]),
            comments_count: count_field(mblog, &["comments_count"]),
            attitudes_count: count_field(mblog, &["attitudes_count"]),
            is_long_text: mblog.get("isLongText").and_then(Value::as_bool).unwrap_or(false),
            pic_urls,
            video_url,
            raw: mblog.clone(),
        }
    }
}

/// A comment on a post.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Comment {
    /// Comment id.
    pub id: String,
    /// Id of the commenter.
    pub user_id: String,
    /// Display name of the commenter.
    pub user_screen_name: String,
    /// Text with markup removed.
    pub text: String,
    /// Creation time as reported by the API.
    pub created_at: String,
    /// Commenter location or client, as reported by the API.
    pub source: String,
    /// Number of likes.
    pub like_count: u64,
    /// The object this comment was built from.
    #[serde(skip)]
    pub raw: Value,
}

impl Comment {
    /// Build a comment from one entry of a comment listing.
    pub fn from_value(data: &Value) -> Self {
        let user = data.get("user");
        Self {
            id: string_field(data, &["id"]),
            user_id: user.map(|u| string_field(u, &["id"])).unwrap_or_default(),
            user_screen_name: user
                .map(|u| string_field(u, &["screen_name"]))
                .unwrap_or_default(),
            text: strip_tags(&string_field(data, &["text"])),
            created_at: string_field(data, &["created_at"]),
            source: string_field(data, &["source"]),
            like_count: count_field(data, &["like_count", "like_counts"]),
            raw: data.clone(),
        }
    }
}

/// One page of comments on a post.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommentPage {
    /// Comments on this page.
    pub comments: Vec<Comment>,
    /// Total comments on the post, as reported by the API.
    pub total_number: u64,
    /// Last page number, 0 when the API does not say.
    pub max_page: u32,
}

impl CommentPage {
    /// Build a page from a comment listing response.
    pub fn from_response(data: &Value) -> Self {
        let listing = data.pointer("/data/data").and_then(Value::as_array);
        Self {
            comments: listing
                .map(|items| items.iter().map(Comment::from_value).collect())
                .unwrap_or_default(),
            total_number: data
                .get("data")
                .map(|d| count_field(d, &["total_number"]))
                .unwrap_or(0),
            max_page: data
                .pointer("/data/max")
                .and_then(Value::as_u64)
                .and_then(|max| u32::try_from(max).ok())
                .unwrap_or(0),
        }
    }
}

/// Posts found in a container response: `card_type` 9 cards, also inside card groups.
pub fn posts_from_cards(data: &Value) -> Vec<Post> {
    let mut posts = Vec::new();
    let cards = data
        .pointer("/data/cards")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for card in cards {
        let group = card.get("card_group").and_then(Value::as_array);
        let candidates = std::iter::once(card).chain(group.into_iter().flatten());
        for candidate in candidates {
            if candidate.get("card_type").and_then(Value::as_i64) == Some(9) {
                if let Some(mblog) = candidate.get("mblog") {
                    posts.push(Post::from_value(mblog));
                }
            }
        }
    }
    posts
}

/// Users found in a user-search response: `card_type` 10 cards inside `card_type` 11 groups.
pub fn users_from_search_cards(data: &Value) -> Vec<User> {
    let cards = data
        .pointer("/data/cards")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    cards
        .iter()
        .filter(|card| card.get("card_type").and_then(Value::as_i64) == Some(11))
        .filter_map(|card| card.get("card_group").and_then(Value::as_array))
        .flatten()
        .filter(|card| card.get("card_type").and_then(Value::as_i64) == Some(10))
        .filter_map(|card| card.get("user"))
        .filter(|user| user.as_object().is_some_and(|u| !u.is_empty()))
        .map(User::from_value)
        .collect()
}

fn string_field(data: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| data.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

/// Counts arrive as numbers, numeric strings, or abbreviations like "1.2万".
fn count_field(data: &Value, keys: &[&str]) -> u64 {
    keys.iter()
        .filter_map(|key| data.get(*key))
        .find_map(|value| match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => parse_count(s),
            _ => None,
        })
        .unwrap_or(0)
}

fn parse_count(text: &str) -> Option<u64> {
    let text = text.trim().trim_end_matches('+');
    let (number, multiplier) = if let Some(n) = text.strip_suffix('万') {
        (n, 10_000.0)
    } else if let Some(n) = text.strip_suffix('亿') {
        (n, 100_000_000.0)
    } else {
        (text, 1.0)
    };
    number
        .trim()
        .parse::<f64>()
        .ok()
        .map(|n| (n * multiplier).round() as u64)
}

fn strip_tags(html: &str) -> String {
    let text = LINE_BREAK.replace_all(html, "\n");
    TAG.replace_all(&text, "").trim().to_string()
}
