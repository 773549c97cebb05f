//! Normalized view of an incoming HTTP request.
//!
//! Every request entering the pipeline is flattened into a `RequestDetails`
//! before any mode, matcher or middleware sees it. Normalization rules:
//! upper-case method, lower-case destination with default ports stripped,
//! percent-decoded path, and a query string re-assembled from its pairs in
//! ascending key order (ties broken by value) so that `a=1&b=2` and
//! `b=2&a=1` produce the same view.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDetails {
    pub scheme: String,
    pub method: String,
    pub destination: String,
    pub path: String,
    pub query: String,
    #[serde(default, with = "super::body_serde")]
    pub body: Vec<u8>,
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
}

impl RequestDetails {
    /// Build a `RequestDetails` from the pieces the proxy listener extracts
    /// out of a hyper request.
    pub fn new(
        scheme: &str,
        method: &str,
        authority: &str,
        path: &str,
        query: Option<&str>,
        headers: &hyper::HeaderMap,
        body: &[u8],
    ) -> Self {
        let mut header_map: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                header_map
                    .entry(canonical_header_name(name.as_str()))
                    .or_default()
                    .push(value.to_string());
            }
        }

        RequestDetails {
            scheme: scheme.to_lowercase(),
            method: method.to_uppercase(),
            destination: normalize_destination(authority, scheme),
            path: percent_decode(path),
            query: canonicalize_query(query),
            body: body.to_vec(),
            headers: header_map,
        }
    }

    /// UTF-8 view of the body for lexical matching and templating; the raw
    /// bytes stay authoritative for forwarding.
    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Case-insensitive header lookup returning the joined value list.
    pub fn header_values(&self, name: &str) -> Option<&Vec<String>> {
        let wanted = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == wanted)
            .map(|(_, v)| v)
    }

    /// Single query parameter value, if present.
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k == key).then(|| v.to_string())
        })
    }

    /// The absolute URL of this request, without the query string.
    pub fn base_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.destination, self.path)
    }
}

/// Lower-case the host and drop the port when it is the scheme default.
fn normalize_destination(authority: &str, scheme: &str) -> String {
    let authority = authority.to_lowercase();
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let default = match scheme {
                "https" => "443",
                _ => "80",
            };
            if port == default {
                host.to_string()
            } else {
                authority
            }
        }
        _ => authority,
    }
}

/// Sort query pairs by key (stable tie-break on value), percent-decoding
/// both sides, and re-join them. An absent query becomes the empty string.
pub fn canonicalize_query(query: Option<&str>) -> String {
    let raw = match query {
        Some(q) if !q.is_empty() => q,
        _ => return String::new(),
    };

    let mut pairs: Vec<(String, String)> = raw
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (percent_decode(k), percent_decode(v)),
            None => (percent_decode(pair), String::new()),
        })
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

pub fn percent_decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|d| d.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Canonical HTTP header casing: `content-type` -> `Content-Type`.
pub fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
