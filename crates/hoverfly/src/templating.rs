//! Response-body templating.
//!
//! Bodies flagged `templated` are rendered at serve time against the matched
//! request. Syntax is `{{ ... }}` with dotted request paths
//! (`Request.Path`, `Request.QueryParam.foo`, `Request.Header.Authorization`)
//! and a small helper set for time and randomness. Unknown expressions render
//! as the empty string; an unterminated `{{` fails the render.

use crate::models::RequestDetails;
use once_cell::sync::Lazy;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

static EXPRESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([^{}]*)\}\}").expect("template pattern is valid"));

#[derive(Debug, Error)]
#[error("Error when rendering response body template: {0}")]
pub struct TemplateError(String);

/// Render a templated body against the matched request.
pub fn render(template: &str, request: &RequestDetails) -> Result<String, TemplateError> {
    let rendered = EXPRESSION
        .replace_all(template, |caps: &regex::Captures| {
            evaluate(caps[1].trim(), request)
        })
        .to_string();

    if rendered.contains("{{") {
        return Err(TemplateError(
            "unterminated {{ expression in body".to_string(),
        ));
    }

    Ok(rendered)
}

fn evaluate(expression: &str, request: &RequestDetails) -> String {
    let mut tokens = expression.split_whitespace();
    let head = match tokens.next() {
        Some(head) => head,
        None => return String::new(),
    };
    let argument = tokens.next();

    if let Some(field) = head.strip_prefix("Request.") {
        return request_field(field, request);
    }

    match head {
        "iso8601DateTime" => now_rfc3339(OffsetDateTime::now_utc()),
        "iso8601DateTimePlusDays" => {
            let days = argument.and_then(|d| d.parse::<i64>().ok()).unwrap_or(0);
            now_rfc3339(OffsetDateTime::now_utc() + Duration::days(days))
        }
        "randomString" => random_string(10),
        "randomStringLength" => {
            let length = argument.and_then(|l| l.parse::<usize>().ok()).unwrap_or(0);
            random_string(length)
        }
        "randomBoolean" => rand::thread_rng().gen_bool(0.5).to_string(),
        "randomEmail" => format!(
            "{}.{}@example.com",
            random_string(6).to_lowercase(),
            random_string(6).to_lowercase()
        ),
        "randomIPv4" => {
            let mut rng = rand::thread_rng();
            format!(
                "{}.{}.{}.{}",
                rng.gen::<u8>(),
                rng.gen::<u8>(),
                rng.gen::<u8>(),
                rng.gen::<u8>()
            )
        }
        "randomIPv6" => {
            let mut rng = rand::thread_rng();
            (0..8)
                .map(|_| format!("{:x}", rng.gen::<u16>()))
                .collect::<Vec<_>>()
                .join(":")
        }
        _ => String::new(),
    }
}

fn request_field(field: &str, request: &RequestDetails) -> String {
    match field {
        "Path" => request.path.clone(),
        "Method" => request.method.clone(),
        "Scheme" => request.scheme.clone(),
        "Destination" => request.destination.clone(),
        "Body" => request.body_str().into_owned(),
        "Query" => request.query.clone(),
        _ => {
            if let Some(key) = field.strip_prefix("QueryParam.") {
                request.query_param(key).unwrap_or_default()
            } else if let Some(name) = field.strip_prefix("Header.") {
                request
                    .header_values(name)
                    .map(|values| values.join(";"))
                    .unwrap_or_default()
            } else {
                String::new()
            }
        }
    }
}

fn now_rfc3339(instant: OffsetDateTime) -> String {
    instant.format(&Rfc3339).unwrap_or_default()
}

fn random_string(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}
