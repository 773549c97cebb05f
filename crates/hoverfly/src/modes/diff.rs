//! Diff mode: forward upstream while also matching the simulation, then
//! record field-level differences between the two responses.

use crate::engine::Hoverfly;
use crate::models::{RequestDetails, ResponseDetails};
use crate::modes::ModeError;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Simplified request view keying the diff store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SimpleRequestView {
    pub method: String,
    pub host: String,
    pub path: String,
    pub query: String,
}

impl SimpleRequestView {
    pub fn of(request: &RequestDetails) -> Self {
        SimpleRequestView {
            method: request.method.clone(),
            host: request.destination.clone(),
            path: request.path.clone(),
            query: request.query.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    pub timestamp: String,
    pub diff_entries: Vec<DiffReportEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffReportEntry {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

pub async fn process(
    hoverfly: &Hoverfly,
    request: &RequestDetails,
    headers_blacklist: &[String],
) -> Result<ResponseDetails, ModeError> {
    let actual = hoverfly.do_request(request).await?;

    // A missing simulation entry is itself worth reporting, but the upstream
    // response is always what the client receives.
    if let Ok(expected) = hoverfly.get_response(request).await {
        let entries = diff_responses(&expected, &actual, headers_blacklist);
        if !entries.is_empty() {
            hoverfly.add_diff(
                SimpleRequestView::of(request),
                DiffReport {
                    timestamp: OffsetDateTime::now_utc()
                        .format(&Rfc3339)
                        .unwrap_or_default(),
                    diff_entries: entries,
                },
            );
        }
    }

    Ok(actual)
}

/// Compare status, headers (minus the blacklist) and body. JSON bodies are
/// compared structurally when the upstream response declares JSON.
fn diff_responses(
    expected: &ResponseDetails,
    actual: &ResponseDetails,
    headers_blacklist: &[String],
) -> Vec<DiffReportEntry> {
    let mut entries = Vec::new();

    if expected.status != actual.status {
        entries.push(DiffReportEntry {
            field: "status".to_string(),
            expected: expected.status.to_string(),
            actual: actual.status.to_string(),
        });
    }

    let blacklisted = |name: &str| {
        headers_blacklist
            .iter()
            .any(|blocked| blocked == "*" || blocked.eq_ignore_ascii_case(name))
    };

    for (name, expected_values) in &expected.headers {
        if blacklisted(name) {
            continue;
        }
        let actual_values = actual.header_join(name);
        let expected_values = expected_values.join(";");
        if actual_values.as_deref() != Some(expected_values.as_str()) {
            entries.push(DiffReportEntry {
                field: format!("header/{name}"),
                expected: expected_values,
                actual: actual_values.unwrap_or_else(|| "undefined".to_string()),
            });
        }
    }

    let is_json = actual
        .header_join("Content-Type")
        .map(|ct| ct.contains("json"))
        .unwrap_or(false);

    if is_json {
        diff_json_bodies(&expected.body_str(), &actual.body_str(), &mut entries);
    } else if expected.body != actual.body {
        entries.push(DiffReportEntry {
            field: "body".to_string(),
            expected: expected.body_str().into_owned(),
            actual: actual.body_str().into_owned(),
        });
    }

    entries
}

fn diff_json_bodies(expected: &str, actual: &str, entries: &mut Vec<DiffReportEntry>) {
    match (
        serde_json::from_str::<serde_json::Value>(expected),
        serde_json::from_str::<serde_json::Value>(actual),
    ) {
        (Ok(expected_doc), Ok(actual_doc)) => {
            diff_json_values("body", &expected_doc, &actual_doc, entries)
        }
        _ => {
            if expected != actual {
                entries.push(DiffReportEntry {
                    field: "body".to_string(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
    }
}

fn diff_json_values(
    path: &str,
    expected: &serde_json::Value,
    actual: &serde_json::Value,
    entries: &mut Vec<DiffReportEntry>,
) {
    use serde_json::Value;
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => {
            for (key, expected_value) in exp {
                match act.get(key) {
                    Some(actual_value) => diff_json_values(
                        &format!("{path}/{key}"),
                        expected_value,
                        actual_value,
                        entries,
                    ),
                    None => entries.push(DiffReportEntry {
                        field: format!("{path}/{key}"),
                        expected: expected_value.to_string(),
                        actual: "undefined".to_string(),
                    }),
                }
            }
        }
        (Value::Array(exp), Value::Array(act)) if exp.len() == act.len() => {
            for (index, (expected_value, actual_value)) in exp.iter().zip(act.iter()).enumerate() {
                diff_json_values(
                    &format!("{path}/{index}"),
                    expected_value,
                    actual_value,
                    entries,
                );
            }
        }
        _ => {
            if expected != actual {
                entries.push(DiffReportEntry {
                    field: path.to_string(),
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn response(status: u16, body: &str, content_type: Option<&str>) -> ResponseDetails {
        let mut headers = HashMap::new();
        if let Some(ct) = content_type {
            headers.insert("Content-Type".to_string(), vec![ct.to_string()]);
        }
        ResponseDetails {
            status,
            body: body.as_bytes().to_vec(),
            headers,
            ..Default::default()
        }
    }

    #[test]
    fn test_identical_responses_produce_no_entries() {
        let a = response(200, "same", None);
        let entries = diff_responses(&a, &a.clone(), &[]);
        assert!(entries.is_empty());
    }

    #[test]
    fn test_status_difference_reported() {
        let entries = diff_responses(&response(200, "x", None), &response(404, "x", None), &[]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field, "status");
        assert_eq!(entries[0].expected, "200");
        assert_eq!(entries[0].actual, "404");
    }

    #[test]
    fn test_json_bodies_diffed_structurally() {
        let expected = response(200, r#"{"a": 1, "b": {"c": 2}}"#, Some("application/json"));
        let actual = response(200, r#"{"b": {"c": 3}, "a": 1}"#, Some("application/json"));

        let entries = diff_responses(&expected, &actual, &[]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field, "body/b/c");
        assert_eq!(entries[0].expected, "2");
        assert_eq!(entries[0].actual, "3");
    }

    #[test]
    fn test_text_bodies_diffed_whole() {
        let entries = diff_responses(
            &response(200, "one", None),
            &response(200, "two", None),
            &[],
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field, "body");
    }

    #[test]
    fn test_blacklisted_headers_are_skipped() {
        let mut expected = response(200, "x", None);
        expected
            .headers
            .insert("Date".to_string(), vec!["yesterday".to_string()]);
        let actual = response(200, "x", None);

        assert_eq!(diff_responses(&expected, &actual, &[]).len(), 1);
        assert!(diff_responses(&expected, &actual, &["Date".to_string()]).is_empty());
        assert!(diff_responses(&expected, &actual, &["*".to_string()]).is_empty());
    }
}
