//! Parsing of proxy vending API responses.
//!
//! Vendors answer in many shapes. The default parser understands:
//!
//! - plain text `host:port` or `host:port:user:pass`, first non-empty line wins
//! - plain text with a scheme, e.g. `socks5://host:port`
//! - JSON `{"proxy": "http://host:port"}`
//! - JSON `{"ip": "...", "port": "..."}` with optional `username`/`password`,
//!   either at the top level or under `data`
//! - JSON `{"data": [...]}`, where the first element is an object as above
//!   or a text proxy

use crate::error::ProxyParseError;

use serde_json::{Map, Value};

const SUPPORTED_SCHEMES: [&str; 4] = ["http://", "https://", "socks4://", "socks5://"];

/// Body of a proxy API response, as handed to a parser.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyApiResponse {
    /// The body decoded as JSON.
    Json(Value),
    /// The body was not valid JSON.
    Text(String),
}

impl ProxyApiResponse {
    /// Decode a raw body, preferring JSON.
    pub fn from_body(body: String) -> Self {
        match serde_json::from_str(&body) {
            Ok(value) => ProxyApiResponse::Json(value),
            Err(_) => ProxyApiResponse::Text(body),
        }
    }
}

/// Default proxy API response parser.
pub fn default_api_parser(response: &ProxyApiResponse) -> Result<String, ProxyParseError> {
    match response {
        ProxyApiResponse::Text(text) => parse_text(text),
        ProxyApiResponse::Json(value) => parse_json(value),
    }
}

fn parse_text(text: &str) -> Result<String, ProxyParseError> {
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or(ProxyParseError::EmptyText)?;

    if SUPPORTED_SCHEMES.iter().any(|scheme| line.starts_with(scheme)) {
        return match line.split_once("://") {
            Some((_, rest)) if rest.contains(':') => Ok(line.to_string()),
            _ => Err(ProxyParseError::InvalidFormat(line.to_string())),
        };
    }

    if !line.contains(':') {
        return Err(ProxyParseError::InvalidFormat(line.to_string()));
    }

    let parts: Vec<&str> = line.split(':').collect();
    match parts.as_slice() {
        [host, port] => {
            let port = validate_port(port)?;
            Ok(format_proxy_url(host, port, None))
        }
        [host, port, username, password] => {
            let port = validate_port(port)?;
            Ok(format_proxy_url(host, port, Some((username, password))))
        }
        _ => Err(ProxyParseError::InvalidFormat(line.to_string())),
    }
}

fn parse_json(value: &Value) -> Result<String, ProxyParseError> {
    let object = match value {
        Value::String(text) => return parse_text(text),
        Value::Object(object) => object,
        other => return Err(ProxyParseError::Unrecognized(other.to_string())),
    };

    if let Some(proxy) = object.get("proxy").and_then(Value::as_str) {
        return Ok(proxy.to_string());
    }

    let data = object.get("data").unwrap_or(value);
    let data = match data {
        Value::Array(items) => match items.first() {
            None => return Err(ProxyParseError::EmptyList),
            Some(Value::String(text)) => return parse_text(text),
            Some(first) => first,
        },
        other => other,
    };

    match data.as_object() {
        Some(entry) if entry.contains_key("ip") && entry.contains_key("port") => {
            parse_ip_port_entry(entry)
        }
        _ => Err(ProxyParseError::Unrecognized(value.to_string())),
    }
}

fn parse_ip_port_entry(entry: &Map<String, Value>) -> Result<String, ProxyParseError> {
    let host = scalar_to_string(&entry["ip"]);
    let port = validate_port(&scalar_to_string(&entry["port"]))?;

    let credentials = match (entry.get("username"), entry.get("password")) {
        (Some(username), Some(password)) => {
            Some((scalar_to_string(username), scalar_to_string(password)))
        }
        _ => None,
    };

    Ok(format_proxy_url(
        &host,
        port,
        credentials.as_ref().map(|(u, p)| (u.as_str(), p.as_str())),
    ))
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn validate_port(port: &str) -> Result<u16, ProxyParseError> {
    match port.trim().parse::<u16>() {
        Ok(port) if port >= 1 => Ok(port),
        _ => Err(ProxyParseError::InvalidPort(port.to_string())),
    }
}

fn format_proxy_url(host: &str, port: u16, credentials: Option<(&str, &str)>) -> String {
    match credentials {
        Some((username, password)) => format!(
            "http://{}:{}@{}:{}",
            urlencoding::encode(username),
            urlencoding::encode(password),
            host,
            port
        ),
        None => format!("http://{host}:{port}"),
    }
}
