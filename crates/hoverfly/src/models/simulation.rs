//! The simulation store: an ordered collection of request-matcher /
//! response pairs plus the state map used for stateful sequencing.

use super::delay::ResponseDelayList;
use super::response::ResponseDetails;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Matcher set for a single request field. A field matches when *any* of
/// the configured kinds matches; an entirely unset field is a wildcard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFieldMatchers {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub glob_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xml_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xml_templated_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_partial_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_path_match: Option<JsonPathMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xpath_match: Option<String>,
}

impl RequestFieldMatchers {
    pub fn exact(value: impl Into<String>) -> Self {
        RequestFieldMatchers {
            exact_match: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn glob(value: impl Into<String>) -> Self {
        RequestFieldMatchers {
            glob_match: Some(value.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == RequestFieldMatchers::default()
    }
}

/// JSONPath matcher: either a bare expression (non-empty result suffices)
/// or an expression with an expected node value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonPathMatch {
    Expression(String),
    WithExpected { expression: String, expected: String },
}

impl JsonPathMatch {
    pub fn expression(&self) -> &str {
        match self {
            JsonPathMatch::Expression(expr) => expr,
            JsonPathMatch::WithExpected { expression, .. } => expression,
        }
    }

    pub fn expected(&self) -> Option<&str> {
        match self {
            JsonPathMatch::Expression(_) => None,
            JsonPathMatch::WithExpected { expected, .. } => Some(expected),
        }
    }
}

/// Per-request matcher: one field-matcher set per request field, one per
/// named header, and the state entries that must hold for the pair to fire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMatcher {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<RequestFieldMatchers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<RequestFieldMatchers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<RequestFieldMatchers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<RequestFieldMatchers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<RequestFieldMatchers>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<RequestFieldMatchers>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, RequestFieldMatchers>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub requires_state: HashMap<String, String>,
}

impl RequestMatcher {
    /// Structural equality ignoring `requiresState`, used to recognise
    /// sequence runs of otherwise-identical matchers.
    pub fn same_shape(&self, other: &RequestMatcher) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.requires_state.clear();
        b.requires_state.clear();
        a == b
    }

    /// Header names this matcher constrains, canonical order not implied.
    pub fn header_names(&self) -> impl Iterator<Item = &String> {
        self.headers.keys()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMatcherResponsePair {
    pub request: RequestMatcher,
    pub response: ResponseDetails,
}

/// Owned by the engine; all mutation goes through the engine's store lock.
#[derive(Debug, Default)]
pub struct Simulation {
    pairs: Vec<RequestMatcherResponsePair>,
    pub response_delays: ResponseDelayList,
    pub state: HashMap<String, String>,
}

impl Simulation {
    pub fn new() -> Self {
        Simulation::default()
    }

    /// Insert a pair, skipping exact structural duplicates.
    pub fn add_pair(&mut self, pair: RequestMatcherResponsePair) {
        let duplicate = self.pairs.iter().any(|saved| saved.request == pair.request);
        if !duplicate {
            self.pairs.push(pair);
        }
    }

    /// Insert a pair, sequencing it behind any pairs whose matcher is
    /// structurally identical (ignoring state). Existing members of the run
    /// are rewritten so that `requiresState.sequence` walks 1..N and each
    /// response transitions to the next value; the newcomer joins as N+1.
    pub fn add_pair_in_sequence(&mut self, mut pair: RequestMatcherResponsePair) {
        let mut run_length = 0;

        for saved in self.pairs.iter_mut() {
            if !saved.request.same_shape(&pair.request) {
                continue;
            }
            run_length += 1;

            let sequence = match saved.request.requires_state.get("sequence") {
                Some(existing) => existing.clone(),
                None => {
                    self.state.insert("sequence".to_string(), "1".to_string());
                    "1".to_string()
                }
            };
            let next = sequence
                .parse::<u64>()
                .map(|n| (n + 1).to_string())
                .unwrap_or_else(|_| "2".to_string());

            saved
                .request
                .requires_state
                .insert("sequence".to_string(), sequence);
            saved
                .response
                .transitions_state
                .insert("sequence".to_string(), next);
        }

        if run_length != 0 {
            pair.request
                .requires_state
                .insert("sequence".to_string(), (run_length + 1).to_string());
        }

        self.pairs.push(pair);
    }

    pub fn pairs(&self) -> &[RequestMatcherResponsePair] {
        &self.pairs
    }

    pub fn replace_pairs(&mut self, pairs: Vec<RequestMatcherResponsePair>) {
        self.pairs = pairs;
    }

    pub fn delete_pairs(&mut self) {
        self.pairs.clear();
        self.state.clear();
        self.response_delays.clear();
    }

    /// Apply a matched response's `transitionsState` to the state map.
    pub fn transition_state(&mut self, transitions: &HashMap<String, String>) {
        for (key, value) in transitions {
            self.state.insert(key.clone(), value.clone());
        }
    }

    /// Every header name referenced by any matcher, for cache keying.
    pub fn matched_header_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .pairs
            .iter()
            .flat_map(|p| p.request.header_names().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair_for_path(path: &str, body: &str) -> RequestMatcherResponsePair {
        RequestMatcherResponsePair {
            request: RequestMatcher {
                path: Some(RequestFieldMatchers::exact(path)),
                ..Default::default()
            },
            response: ResponseDetails {
                status: 200,
                body: body.as_bytes().to_vec(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_add_pair_skips_structural_duplicates() {
        let mut simulation = Simulation::new();
        simulation.add_pair(pair_for_path("/a", "one"));
        simulation.add_pair(pair_for_path("/a", "two"));
        assert_eq!(simulation.pairs().len(), 1);
        assert_eq!(simulation.pairs()[0].response.body, b"one");
    }

    #[test]
    fn test_add_pair_keeps_distinct_matchers() {
        let mut simulation = Simulation::new();
        simulation.add_pair(pair_for_path("/a", "one"));
        simulation.add_pair(pair_for_path("/b", "two"));
        assert_eq!(simulation.pairs().len(), 2);
    }

    #[test]
    fn test_add_pair_in_sequence_assigns_consecutive_sequence_values() {
        let mut simulation = Simulation::new();
        simulation.add_pair_in_sequence(pair_for_path("/a", "first"));
        simulation.add_pair_in_sequence(pair_for_path("/a", "second"));
        simulation.add_pair_in_sequence(pair_for_path("/a", "third"));

        let pairs = simulation.pairs();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].request.requires_state["sequence"], "1");
        assert_eq!(pairs[0].response.transitions_state["sequence"], "2");
        assert_eq!(pairs[1].request.requires_state["sequence"], "2");
        assert_eq!(pairs[1].response.transitions_state["sequence"], "3");
        assert_eq!(pairs[2].request.requires_state["sequence"], "3");
        assert!(pairs[2].response.transitions_state.is_empty());

        // The store primes the sequence counter on first duplication.
        assert_eq!(simulation.state["sequence"], "1");
    }

    #[test]
    fn test_add_pair_in_sequence_without_duplicate_adds_no_state() {
        let mut simulation = Simulation::new();
        simulation.add_pair_in_sequence(pair_for_path("/a", "only"));
        assert!(simulation.pairs()[0].request.requires_state.is_empty());
        assert!(simulation.state.is_empty());
    }

    #[test]
    fn test_same_shape_ignores_requires_state() {
        let mut a = pair_for_path("/a", "one").request;
        let b = pair_for_path("/a", "two").request;
        a.requires_state
            .insert("sequence".to_string(), "1".to_string());
        assert!(a.same_shape(&b));
    }

    #[test]
    fn test_delete_pairs_clears_state_and_delays() {
        let mut simulation = Simulation::new();
        simulation.add_pair(pair_for_path("/a", "one"));
        simulation
            .state
            .insert("sequence".to_string(), "2".to_string());
        simulation.delete_pairs();
        assert!(simulation.pairs().is_empty());
        assert!(simulation.state.is_empty());
    }
}
