//! Structured body matcher kinds: XML equality (plain and templated),
//! JSON equality, JSON subset, JSONPath and XPath.

use once_cell::sync::Lazy;
use regex::Regex;
use sxd_document::dom::{ChildOfElement, Element};
use sxd_document::parser as xml_parser;
use sxd_xpath::{evaluate_xpath, Value as XPathValue};

/// `{{ .anything }}` hole in a templated XML matcher.
static XML_HOLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{\s*\.\S*\s*\}\}$").expect("hole pattern is valid"));

/// XML equality after canonical whitespace stripping and attribute sorting.
pub fn xml_match(pattern: &str, value: &str) -> bool {
    xml_compare(pattern, value, false)
}

/// XML tree equality where `{{ .anything }}` holes in the pattern match any
/// single subtree (element content, text or attribute value).
pub fn xml_templated_match(pattern: &str, value: &str) -> bool {
    xml_compare(pattern, value, true)
}

fn xml_compare(pattern: &str, value: &str, templated: bool) -> bool {
    let expected = match xml_parser::parse(pattern) {
        Ok(package) => package,
        Err(_) => return false,
    };
    let actual = match xml_parser::parse(value) {
        Ok(package) => package,
        Err(_) => return false,
    };

    match (
        expected.as_document().root().children().into_iter().find_map(root_element),
        actual.as_document().root().children().into_iter().find_map(root_element),
    ) {
        (Some(a), Some(b)) => elements_equal(a, b, templated),
        _ => false,
    }
}

fn root_element(child: sxd_document::dom::ChildOfRoot) -> Option<Element> {
    match child {
        sxd_document::dom::ChildOfRoot::Element(element) => Some(element),
        _ => None,
    }
}

fn elements_equal(expected: Element, actual: Element, templated: bool) -> bool {
    if expected.name() != actual.name() {
        return false;
    }

    let attr_key = |a: &sxd_document::dom::Attribute| {
        (
            a.name().namespace_uri().unwrap_or("").to_string(),
            a.name().local_part().to_string(),
        )
    };
    let mut expected_attrs: Vec<((String, String), String)> = expected
        .attributes()
        .iter()
        .map(|a| (attr_key(a), a.value().to_string()))
        .collect();
    let mut actual_attrs: Vec<((String, String), String)> = actual
        .attributes()
        .iter()
        .map(|a| (attr_key(a), a.value().to_string()))
        .collect();
    expected_attrs.sort();
    actual_attrs.sort();

    if expected_attrs.len() != actual_attrs.len() {
        return false;
    }
    for ((expected_name, expected_value), (actual_name, actual_value)) in
        expected_attrs.iter().zip(actual_attrs.iter())
    {
        if expected_name != actual_name {
            return false;
        }
        if templated && XML_HOLE.is_match(expected_value.trim()) {
            continue;
        }
        if expected_value != actual_value {
            return false;
        }
    }

    let expected_children = significant_children(expected);
    let actual_children = significant_children(actual);
    if expected_children.len() != actual_children.len() {
        return false;
    }

    expected_children
        .into_iter()
        .zip(actual_children)
        .all(|(e, a)| match (e, a) {
            (ChildOfElement::Element(e), ChildOfElement::Element(a)) => {
                elements_equal(e, a, templated)
            }
            (ChildOfElement::Text(e), other) => {
                let expected_text = e.text().trim().to_string();
                if templated && XML_HOLE.is_match(&expected_text) {
                    return true;
                }
                match other {
                    ChildOfElement::Text(a) => expected_text == a.text().trim(),
                    _ => false,
                }
            }
            // A hole never sits on the element side of the pattern.
            _ => false,
        })
}

/// Children that survive canonical whitespace stripping.
fn significant_children(element: Element) -> Vec<ChildOfElement> {
    element
        .children()
        .into_iter()
        .filter(|child| match child {
            ChildOfElement::Element(_) => true,
            ChildOfElement::Text(text) => !text.text().trim().is_empty(),
            _ => false,
        })
        .collect()
}

/// Deep JSON equality after normalizing number formats: both documents must
/// carry the same keys and values, with `1` and `1.0` considered equal.
pub fn json_match(pattern: &str, value: &str) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(pattern),
        serde_json::from_str::<serde_json::Value>(value),
    ) {
        (Ok(expected), Ok(actual)) => json_equal(&expected, &actual),
        _ => false,
    }
}

/// Every path present in the pattern must exist in the value with an equal
/// value; the value may carry extra fields.
pub fn json_partial_match(pattern: &str, value: &str) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(pattern),
        serde_json::from_str::<serde_json::Value>(value),
    ) {
        (Ok(expected), Ok(actual)) => json_subset(&expected, &actual),
        _ => false,
    }
}

fn json_equal(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    use serde_json::Value;
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(i, j)| json_equal(i, j))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, xv)| y.get(key).is_some_and(|yv| json_equal(xv, yv)))
        }
        _ => a == b,
    }
}

fn json_subset(expected: &serde_json::Value, actual: &serde_json::Value) -> bool {
    use serde_json::Value;
    match (expected, actual) {
        (Value::Object(exp), Value::Object(act)) => exp
            .iter()
            .all(|(key, ev)| act.get(key).is_some_and(|av| json_subset(ev, av))),
        (Value::Array(exp), Value::Array(act)) => exp
            .iter()
            .all(|ev| act.iter().any(|av| json_subset(ev, av))),
        _ => json_equal(expected, actual),
    }
}

/// Evaluate a JSONPath expression; `expected` (when given) must equal the
/// string form of a resulting node, otherwise any result satisfies.
pub fn json_path_match(expression: &str, expected: Option<&str>, value: &str) -> bool {
    let document: serde_json::Value = match serde_json::from_str(value) {
        Ok(doc) => doc,
        Err(_) => return false,
    };

    let trimmed = expression
        .strip_prefix("$.")
        .or_else(|| expression.strip_prefix('$'))
        .unwrap_or(expression);

    match json_path_lookup(&document, trimmed) {
        Some(node) => match expected {
            Some(expected) => node_string(node) == expected,
            None => true,
        },
        None => false,
    }
}

fn node_string(node: &serde_json::Value) -> String {
    match node {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Walk a dotted JSONPath (`a.b[0].c`, `items[*].id`) through a document.
fn json_path_lookup<'a>(
    value: &'a serde_json::Value,
    path: &str,
) -> Option<&'a serde_json::Value> {
    if path.is_empty() {
        return Some(value);
    }

    // Index segment: [n] or [*]
    if let Some(rest) = path.strip_prefix('[') {
        let close = rest.find(']')?;
        let index = &rest[..close];
        let tail = rest[close + 1..].trim_start_matches('.');

        return match index {
            "*" => value
                .as_array()?
                .iter()
                .find_map(|item| json_path_lookup(item, tail)),
            n => json_path_lookup(value.as_array()?.get(n.parse::<usize>().ok()?)?, tail),
        };
    }

    // Key segment up to the next '.' or '['
    let end = path
        .find(|c| c == '.' || c == '[')
        .unwrap_or(path.len());
    let (key, mut tail) = path.split_at(end);
    tail = tail.strip_prefix('.').unwrap_or(tail);

    json_path_lookup(value.as_object()?.get(key)?, tail)
}

/// XPath matching: the expression must evaluate to a non-empty node set
/// (or a truthy scalar) against the request body.
pub fn xpath_match(expression: &str, value: &str) -> bool {
    let package = match xml_parser::parse(value) {
        Ok(package) => package,
        Err(_) => return false,
    };
    let document = package.as_document();

    match evaluate_xpath(&document, expression) {
        Ok(XPathValue::Nodeset(nodes)) => nodes.size() > 0,
        Ok(XPathValue::Boolean(b)) => b,
        Ok(XPathValue::String(s)) => !s.is_empty(),
        Ok(XPathValue::Number(n)) => !n.is_nan(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_match_ignores_whitespace_and_attribute_order() {
        let pattern = r#"<order b="2" a="1"><item>x</item></order>"#;
        let value = "<order a=\"1\" b=\"2\">\n  <item>x</item>\n</order>";
        assert!(xml_match(pattern, value));
    }

    #[test]
    fn test_xml_match_rejects_different_content() {
        assert!(!xml_match("<a><b>1</b></a>", "<a><b>2</b></a>"));
        assert!(!xml_match("<a/>", "<b/>"));
        assert!(!xml_match("<a/>", "not xml"));
    }

    #[test]
    fn test_xml_templated_holes_match_any_subtree() {
        let pattern = "<order><id>{{ .anything }}</id><total>10</total></order>";
        assert!(xml_templated_match(
            pattern,
            "<order><id>abc-123</id><total>10</total></order>"
        ));
        assert!(xml_templated_match(
            pattern,
            "<order><id><uuid>x</uuid></id><total>10</total></order>"
        ));
        assert!(!xml_templated_match(
            pattern,
            "<order><id>abc</id><total>99</total></order>"
        ));
    }

    #[test]
    fn test_xml_templated_hole_in_attribute() {
        let pattern = r#"<item id="{{ .id }}">x</item>"#;
        assert!(xml_templated_match(pattern, r#"<item id="42">x</item>"#));
    }

    #[test]
    fn test_json_match_normalizes_numbers() {
        assert!(json_match(r#"{"a": 1}"#, r#"{"a": 1.0}"#));
        assert!(json_match(r#"{"a": 1, "b": [2, 3]}"#, r#"{"b": [2, 3], "a": 1}"#));
    }

    #[test]
    fn test_json_match_is_strict_both_ways() {
        assert!(!json_match(r#"{"a": 1}"#, r#"{"a": 1, "b": 2}"#));
        assert!(!json_match(r#"{"a": 1, "b": 2}"#, r#"{"a": 1}"#));
    }

    #[test]
    fn test_json_partial_match_allows_extra_fields() {
        assert!(json_partial_match(
            r#"{"user": {"name": "John"}}"#,
            r#"{"user": {"name": "John", "age": 30}, "extra": true}"#
        ));
        assert!(!json_partial_match(
            r#"{"user": {"name": "Jane"}}"#,
            r#"{"user": {"name": "John"}}"#
        ));
    }

    #[test]
    fn test_json_path_match_with_expected_value() {
        let body = r#"{"items": [{"id": 1}, {"id": 2}]}"#;
        assert!(json_path_match("$.items[0].id", Some("1"), body));
        assert!(json_path_match("$.items[*].id", Some("1"), body));
        assert!(!json_path_match("$.items[0].id", Some("9"), body));
    }

    #[test]
    fn test_json_path_match_without_expected_requires_presence() {
        let body = r#"{"user": {"name": "John"}}"#;
        assert!(json_path_match("$.user.name", None, body));
        assert!(!json_path_match("$.user.missing", None, body));
        assert!(!json_path_match("$.user.name", None, "not json"));
    }

    #[test]
    fn test_xpath_match_requires_non_empty_node_set() {
        let body = "<order><customer><name>Alice</name></customer></order>";
        assert!(xpath_match("/order/customer/name", body));
        assert!(xpath_match("//name", body));
        assert!(!xpath_match("/order/missing", body));
        assert!(!xpath_match("/order", "not xml"));
    }
}
