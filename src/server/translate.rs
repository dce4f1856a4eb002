//! Validation of inbound calls and their translation into [`TargetRequest`]s.

use crate::{config::TargetEndpoint, forwarder::TargetRequest};
use http::HeaderMap;

pub const TARGET_ENDPOINT: &str = "x-target-endpoint";
pub const TARGET_METHOD: &str = "x-target-method";
pub const TARGET_QUERY: &str = "x-target-query";
pub const API_KEY: &str = "x-api-key";

/// Header the destination reads the API key from.
pub const UPSTREAM_API_KEY: &str = "X-MBX-APIKEY";

pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Missing required headers")]
    MissingHeaders,
}

/// Reads the routing headers of an inbound call. Absent or empty endpoint or
/// API key values reject the call; method defaults to `GET` and query to empty.
/// The inbound body, if any, is attached by the caller once it has been read.
pub fn translate(headers: &HeaderMap, target: &TargetEndpoint) -> Result<TargetRequest, Rejection> {
    let endpoint = required(headers, TARGET_ENDPOINT)?;
    let api_key = required(headers, API_KEY)?;
    let method = optional(headers, TARGET_METHOD).unwrap_or("GET");
    let query = optional(headers, TARGET_QUERY).unwrap_or_default();

    // The `?` is kept even for an empty query.
    let path = format!("{endpoint}?{query}");
    log::info!("{method} {path} (API key {})", mask(api_key));

    Ok(TargetRequest::new(method, path)
        .with_header("Host", host_header(target))
        .with_header(UPSTREAM_API_KEY, api_key)
        .with_header("Content-Type", "application/json")
        .with_header("User-Agent", USER_AGENT))
}

fn required<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, Rejection> {
    optional(headers, name).ok_or(Rejection::MissingHeaders)
}

fn optional<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

fn host_header(target: &TargetEndpoint) -> String {
    if target.port == crate::config::HTTPS_PORT {
        target.host.clone()
    } else {
        target.to_string()
    }
}

/// First eight characters of a secret, for log lines.
pub fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(8).collect();
    format!("{visible}...")
}
