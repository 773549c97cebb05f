//! The matching engine: evaluates a normalized request against the
//! simulation store and picks the first pair (insertion order) whose every
//! configured field matcher is satisfied.
//!
//! Within a field the configured matcher kinds are OR-ed; across fields the
//! results are AND-ed; unset fields are wildcards. On an overall miss the
//! engine reports the closest miss: the pair that satisfied the most fields,
//! with the fields and matcher kinds that failed.

pub mod body;
pub mod field;

use crate::models::{
    RequestDetails, RequestFieldMatchers, RequestMatcher, RequestMatcherResponsePair, Simulation,
};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct MissedField {
    pub field: String,
    pub failed_kinds: Vec<&'static str>,
}

#[derive(Debug, Clone, Default)]
pub struct ClosestMiss {
    pub matched_field_count: usize,
    pub missed_fields: Vec<MissedField>,
}

impl ClosestMiss {
    pub fn describe(&self) -> String {
        self.missed_fields
            .iter()
            .map(|m| format!("{} [{}]", m.field, m.failed_kinds.join(", ")))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Error)]
#[error("Could not find a match for request, create or record a matching request first")]
pub struct MatchError {
    pub closest_miss: Option<ClosestMiss>,
}

/// Find the first matching pair for `request` in insertion order.
pub fn match_request<'a>(
    request: &RequestDetails,
    webserver: bool,
    simulation: &'a Simulation,
) -> Result<&'a RequestMatcherResponsePair, MatchError> {
    let mut closest: Option<ClosestMiss> = None;

    for pair in simulation.pairs() {
        let evaluation = evaluate_pair(&pair.request, request, &simulation.state, webserver);
        if evaluation.missed.is_empty() {
            return Ok(pair);
        }

        let better = closest
            .as_ref()
            .map(|c| evaluation.matched >= c.matched_field_count)
            .unwrap_or(true);
        if better {
            closest = Some(ClosestMiss {
                matched_field_count: evaluation.matched,
                missed_fields: evaluation.missed,
            });
        }
    }

    Err(MatchError {
        closest_miss: closest,
    })
}

struct PairEvaluation {
    matched: usize,
    missed: Vec<MissedField>,
}

fn evaluate_pair(
    matcher: &RequestMatcher,
    request: &RequestDetails,
    state: &HashMap<String, String>,
    webserver: bool,
) -> PairEvaluation {
    let mut evaluation = PairEvaluation {
        matched: 0,
        missed: Vec::new(),
    };

    let mut check = |field: &str, matchers: &Option<RequestFieldMatchers>, value: &str| {
        if let Some(matchers) = matchers {
            match evaluate_field(matchers, value) {
                Ok(()) => evaluation.matched += 1,
                Err(failed_kinds) => evaluation.missed.push(MissedField {
                    field: field.to_string(),
                    failed_kinds,
                }),
            }
        }
    };

    // Webserver mode has no scheme to speak of; scheme matchers are skipped.
    if !webserver {
        check("scheme", &matcher.scheme, &request.scheme);
    }
    check("method", &matcher.method, &request.method);
    check("destination", &matcher.destination, &request.destination);
    check("path", &matcher.path, &request.path);
    check("query", &matcher.query, &request.query);
    check("body", &matcher.body, &request.body_str());

    for (name, matchers) in &matcher.headers {
        let value = request
            .header_values(name)
            .map(|values| values.join(";"))
            .unwrap_or_default();
        match evaluate_field(matchers, &value) {
            Ok(()) => evaluation.matched += 1,
            Err(failed_kinds) => evaluation.missed.push(MissedField {
                field: format!("headers.{name}"),
                failed_kinds,
            }),
        }
    }

    if !matcher.requires_state.is_empty() {
        let satisfied = matcher
            .requires_state
            .iter()
            .all(|(key, value)| state.get(key) == Some(value));
        if satisfied {
            evaluation.matched += 1;
        } else {
            evaluation.missed.push(MissedField {
                field: "requiresState".to_string(),
                failed_kinds: vec!["state"],
            });
        }
    }

    evaluation
}

/// OR across the configured kinds; `Err` carries the kinds that failed.
fn evaluate_field(matchers: &RequestFieldMatchers, value: &str) -> Result<(), Vec<&'static str>> {
    let mut failed = Vec::new();

    let mut try_kind = |kind: &'static str, outcome: Option<bool>| -> bool {
        match outcome {
            Some(true) => true,
            Some(false) => {
                failed.push(kind);
                false
            }
            None => false,
        }
    };

    let hit = try_kind(
        "exact",
        matchers
            .exact_match
            .as_deref()
            .map(|p| field::exact_match(p, value)),
    ) || try_kind(
        "glob",
        matchers
            .glob_match
            .as_deref()
            .map(|p| field::glob_match(p, value)),
    ) || try_kind(
        "regex",
        matchers
            .regex_match
            .as_deref()
            .map(|p| field::regex_match(p, value)),
    ) || try_kind(
        "xml",
        matchers
            .xml_match
            .as_deref()
            .map(|p| body::xml_match(p, value)),
    ) || try_kind(
        "xmlTemplated",
        matchers
            .xml_templated_match
            .as_deref()
            .map(|p| body::xml_templated_match(p, value)),
    ) || try_kind(
        "json",
        matchers
            .json_match
            .as_deref()
            .map(|p| body::json_match(p, value)),
    ) || try_kind(
        "jsonPartial",
        matchers
            .json_partial_match
            .as_deref()
            .map(|p| body::json_partial_match(p, value)),
    ) || try_kind(
        "jsonPath",
        matchers
            .json_path_match
            .as_ref()
            .map(|m| body::json_path_match(m.expression(), m.expected(), value)),
    ) || try_kind(
        "xpath",
        matchers
            .xpath_match
            .as_deref()
            .map(|p| body::xpath_match(p, value)),
    );

    if hit || failed.is_empty() {
        Ok(())
    } else {
        Err(failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RequestFieldMatchers, ResponseDetails};

    fn request(destination: &str, path: &str) -> RequestDetails {
        RequestDetails {
            scheme: "http".to_string(),
            method: "GET".to_string(),
            destination: destination.to_string(),
            path: path.to_string(),
            ..Default::default()
        }
    }

    fn pair(matcher: RequestMatcher, body: &str) -> RequestMatcherResponsePair {
        RequestMatcherResponsePair {
            request: matcher,
            response: ResponseDetails {
                status: 200,
                body: body.as_bytes().to_vec(),
                ..Default::default()
            },
        }
    }

    fn destination_path_matcher(destination: &str, path: &str) -> RequestMatcher {
        RequestMatcher {
            destination: Some(RequestFieldMatchers::exact(destination)),
            path: Some(RequestFieldMatchers::exact(path)),
            ..Default::default()
        }
    }

    #[test]
    fn test_match_is_deterministic() {
        let mut simulation = Simulation::new();
        simulation.add_pair(pair(destination_path_matcher("example.com", "/a"), "ok"));

        let req = request("example.com", "/a");
        let first = match_request(&req, false, &simulation).unwrap().response.body.clone();
        let second = match_request(&req, false, &simulation).unwrap().response.body.clone();
        assert_eq!(first, second);
        assert_eq!(first, b"ok");
    }

    #[test]
    fn test_first_pair_in_insertion_order_wins() {
        let mut simulation = Simulation::new();
        simulation.add_pair(pair(destination_path_matcher("example.com", "/a"), "first"));
        simulation.add_pair(pair(
            RequestMatcher {
                destination: Some(RequestFieldMatchers::exact("example.com")),
                ..Default::default()
            },
            "second",
        ));

        let matched = match_request(&request("example.com", "/a"), false, &simulation).unwrap();
        assert_eq!(matched.response.body, b"first");
    }

    #[test]
    fn test_unset_fields_are_wildcards() {
        let mut simulation = Simulation::new();
        simulation.add_pair(pair(RequestMatcher::default(), "anything"));

        let matched = match_request(&request("any.host", "/whatever"), false, &simulation).unwrap();
        assert_eq!(matched.response.body, b"anything");
    }

    #[test]
    fn test_or_within_a_field() {
        let mut simulation = Simulation::new();
        simulation.add_pair(pair(
            RequestMatcher {
                path: Some(RequestFieldMatchers {
                    exact_match: Some("/exact".to_string()),
                    glob_match: Some("/api/*".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            "ok",
        ));

        assert!(match_request(&request("x", "/exact"), false, &simulation).is_ok());
        assert!(match_request(&request("x", "/api/v1"), false, &simulation).is_ok());
        assert!(match_request(&request("x", "/other"), false, &simulation).is_err());
    }

    #[test]
    fn test_requires_state_gates_matching() {
        let mut matcher = destination_path_matcher("example.com", "/a");
        matcher
            .requires_state
            .insert("sequence".to_string(), "2".to_string());

        let mut simulation = Simulation::new();
        simulation.add_pair(pair(matcher, "gated"));

        let req = request("example.com", "/a");
        assert!(match_request(&req, false, &simulation).is_err());

        simulation
            .state
            .insert("sequence".to_string(), "2".to_string());
        assert!(match_request(&req, false, &simulation).is_ok());
    }

    #[test]
    fn test_sequenced_pairs_match_in_order() {
        let mut simulation = Simulation::new();
        simulation.add_pair_in_sequence(pair(destination_path_matcher("example.com", "/a"), "one"));
        simulation.add_pair_in_sequence(pair(destination_path_matcher("example.com", "/a"), "two"));

        let req = request("example.com", "/a");

        let first = match_request(&req, false, &simulation).unwrap();
        assert_eq!(first.response.body, b"one");
        let transitions = first.response.transitions_state.clone();
        simulation.transition_state(&transitions);

        let second = match_request(&req, false, &simulation).unwrap();
        assert_eq!(second.response.body, b"two");
    }

    #[test]
    fn test_header_matching_is_case_insensitive_on_name() {
        let mut matcher = RequestMatcher::default();
        matcher.headers.insert(
            "Authorization".to_string(),
            RequestFieldMatchers::exact("Bearer token"),
        );

        let mut simulation = Simulation::new();
        simulation.add_pair(pair(matcher, "ok"));

        let mut req = request("example.com", "/");
        req.headers.insert(
            "Authorization".to_string(),
            vec!["Bearer token".to_string()],
        );
        assert!(match_request(&req, false, &simulation).is_ok());
    }

    #[test]
    fn test_closest_miss_reports_failed_fields() {
        let mut simulation = Simulation::new();
        simulation.add_pair(pair(destination_path_matcher("example.com", "/a"), "ok"));

        let err = match_request(&request("example.com", "/b"), false, &simulation).unwrap_err();
        let closest = err.closest_miss.unwrap();
        assert_eq!(closest.matched_field_count, 1);
        assert_eq!(closest.missed_fields.len(), 1);
        assert_eq!(closest.missed_fields[0].field, "path");
        assert_eq!(closest.missed_fields[0].failed_kinds, vec!["exact"]);
    }

    #[test]
    fn test_webserver_mode_skips_scheme_matchers() {
        let mut matcher = destination_path_matcher("example.com", "/a");
        matcher.scheme = Some(RequestFieldMatchers::exact("https"));

        let mut simulation = Simulation::new();
        simulation.add_pair(pair(matcher, "ok"));

        let req = request("example.com", "/a");
        assert!(match_request(&req, false, &simulation).is_err());
        assert!(match_request(&req, true, &simulation).is_ok());
    }
}
