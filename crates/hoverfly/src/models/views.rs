//! The simulation wire format and its schema negotiation.
//!
//! Simulations are exchanged as JSON with a `data` block and a `meta` block.
//! Imports accept schema v1, v2 and v3; v1 requests carry scalar strings and
//! are upgraded by wrapping every field as an `exactMatch` (`globMatch` when
//! the v1 `requestType` is `template`). Exports always emit v3.

use super::request::{canonicalize_query, percent_decode};
use super::response::ResponseDetails;
use super::simulation::{
    RequestFieldMatchers, RequestMatcher, RequestMatcherResponsePair, Simulation,
};
use super::delay::{ResponseDelay, ResponseDelayList};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const SCHEMA_V3: &str = "v3";
pub const HOVERFLY_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

pub type RequestMatcherView = RequestMatcher;
pub type DelayView = ResponseDelay;

#[derive(Debug, Error)]
pub enum SimulationImportError {
    #[error("Invalid JSON, missing \"meta.schemaVersion\" string")]
    MissingSchemaVersion,
    #[error("schema version {0} is not supported by this version")]
    UnsupportedSchemaVersion(String),
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("{0}")]
    InvalidBody(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationView {
    pub data: DataView,
    pub meta: MetaView,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataView {
    #[serde(default)]
    pub pairs: Vec<PairView>,
    #[serde(default)]
    pub global_actions: GlobalActionsView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairView {
    pub request: RequestMatcherView,
    pub response: ResponseView,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalActionsView {
    #[serde(default)]
    pub delays: Vec<DelayView>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseView {
    pub status: u16,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub encoded_body: bool,
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub templated: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub transitions_state: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_delay: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaView {
    pub schema_version: String,
    #[serde(default)]
    pub hoverfly_version: String,
    #[serde(default)]
    pub time_exported: String,
}

/// v1 request shape: scalar strings plus an optional `requestType`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestV1View {
    request_type: Option<String>,
    path: Option<String>,
    method: Option<String>,
    destination: Option<String>,
    scheme: Option<String>,
    query: Option<String>,
    body: Option<String>,
    #[serde(default)]
    headers: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
struct PairV1View {
    request: RequestV1View,
    response: ResponseView,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataV1View {
    #[serde(default)]
    pairs: Vec<PairV1View>,
    #[serde(default)]
    global_actions: GlobalActionsView,
}

impl SimulationView {
    /// Parse and schema-negotiate a simulation document, upgrading v1/v2
    /// payloads to the v3 in-memory form.
    pub fn parse(raw: &str) -> Result<SimulationView, SimulationImportError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| SimulationImportError::InvalidJson(e.to_string()))?;

        let schema_version = value
            .get("meta")
            .and_then(|meta| meta.get("schemaVersion"))
            .and_then(|v| v.as_str())
            .ok_or(SimulationImportError::MissingSchemaVersion)?
            .to_string();

        match schema_version.as_str() {
            "v3" => serde_json::from_value(value)
                .map_err(|e| SimulationImportError::InvalidJson(e.to_string())),
            "v2" => Self::upgrade_v2(value),
            "v1" => Self::upgrade_v1(value),
            other => Err(SimulationImportError::UnsupportedSchemaVersion(
                other.to_string(),
            )),
        }
    }

    /// v2 matchers already carry the v3 shape, but their query matcher
    /// values hold the still-encoded wire query and must be percent-decoded
    /// on upgrade.
    fn upgrade_v2(value: serde_json::Value) -> Result<SimulationView, SimulationImportError> {
        let mut view: SimulationView = serde_json::from_value(value)
            .map_err(|e| SimulationImportError::InvalidJson(e.to_string()))?;

        for pair in &mut view.data.pairs {
            if let Some(query) = pair.request.query.as_mut() {
                if let Some(exact) = query.exact_match.take() {
                    query.exact_match =
                        Some(canonicalize_query(Some(&percent_decode(&exact))));
                }
                if let Some(glob) = query.glob_match.take() {
                    query.glob_match = Some(percent_decode(&glob));
                }
            }
        }

        view.meta.schema_version = SCHEMA_V3.to_string();
        Ok(view)
    }

    fn upgrade_v1(value: serde_json::Value) -> Result<SimulationView, SimulationImportError> {
        let meta: MetaView = serde_json::from_value(value.get("meta").cloned().unwrap_or_default())
            .map_err(|e| SimulationImportError::InvalidJson(e.to_string()))?;
        let data: DataV1View = serde_json::from_value(value.get("data").cloned().unwrap_or_default())
            .map_err(|e| SimulationImportError::InvalidJson(e.to_string()))?;

        let pairs = data
            .pairs
            .into_iter()
            .map(|pair| PairView {
                request: upgrade_v1_request(pair.request),
                response: pair.response,
            })
            .collect();

        Ok(SimulationView {
            data: DataView {
                pairs,
                global_actions: data.global_actions,
            },
            meta: MetaView {
                schema_version: SCHEMA_V3.to_string(),
                ..meta
            },
        })
    }

    /// Validate the view and convert it into store pairs plus delay rules.
    pub fn into_simulation_parts(
        self,
    ) -> Result<(Vec<RequestMatcherResponsePair>, ResponseDelayList), SimulationImportError> {
        let mut pairs = Vec::with_capacity(self.data.pairs.len());
        for pair in self.data.pairs {
            let body = ResponseDetails::decode_body(&pair.response.body, pair.response.encoded_body)
                .map_err(SimulationImportError::InvalidBody)?;
            pairs.push(RequestMatcherResponsePair {
                request: pair.request,
                response: ResponseDetails {
                    status: pair.response.status,
                    body,
                    encoded_body: pair.response.encoded_body,
                    headers: pair.response.headers,
                    templated: pair.response.templated,
                    transitions_state: pair.response.transitions_state,
                    fixed_delay: pair.response.fixed_delay,
                },
            });
        }
        Ok((pairs, ResponseDelayList::new(self.data.global_actions.delays)))
    }

    /// Snapshot the store into an exportable v3 view.
    pub fn from_simulation(simulation: &Simulation) -> SimulationView {
        let pairs = simulation
            .pairs()
            .iter()
            .map(|pair| {
                let (body, encoded_body) = pair.response.encode_body();
                PairView {
                    request: pair.request.clone(),
                    response: ResponseView {
                        status: pair.response.status,
                        body,
                        encoded_body,
                        headers: pair.response.headers.clone(),
                        templated: pair.response.templated,
                        transitions_state: pair.response.transitions_state.clone(),
                        fixed_delay: pair.response.fixed_delay,
                    },
                }
            })
            .collect();

        SimulationView {
            data: DataView {
                pairs,
                global_actions: GlobalActionsView {
                    delays: simulation.response_delays.rules().to_vec(),
                },
            },
            meta: MetaView {
                schema_version: SCHEMA_V3.to_string(),
                hoverfly_version: HOVERFLY_VERSION.to_string(),
                time_exported: OffsetDateTime::now_utc()
                    .format(&Rfc3339)
                    .unwrap_or_default(),
            },
        }
    }
}

fn upgrade_v1_request(request: RequestV1View) -> RequestMatcher {
    let glob = request.request_type.as_deref() == Some("template");
    let wrap = |value: Option<String>| -> Option<RequestFieldMatchers> {
        value.map(|v| {
            if glob {
                RequestFieldMatchers::glob(v)
            } else {
                RequestFieldMatchers::exact(v)
            }
        })
    };

    let query = request
        .query
        .map(|q| canonicalize_query(Some(&percent_decode(&q))));

    RequestMatcher {
        scheme: wrap(request.scheme),
        method: wrap(request.method),
        destination: wrap(request.destination),
        path: wrap(request.path),
        query: wrap(query),
        body: wrap(request.body),
        headers: request
            .headers
            .into_iter()
            .map(|(name, values)| {
                let matcher = if glob {
                    RequestFieldMatchers::glob(values.join(";"))
                } else {
                    RequestFieldMatchers::exact(values.join(";"))
                };
                (name, matcher)
            })
            .collect(),
        requires_state: HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_missing_meta() {
        let err = SimulationView::parse(r#"{"data": {"pairs": []}}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid JSON, missing \"meta.schemaVersion\" string"
        );
    }

    #[test]
    fn test_parse_rejects_unknown_schema_version() {
        let err = SimulationView::parse(
            r#"{"data": {"pairs": []}, "meta": {"schemaVersion": "v9"}}"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "schema version v9 is not supported by this version"
        );
    }

    #[test]
    fn test_parse_v3_pair() {
        let view = SimulationView::parse(
            r#"{
                "data": {
                    "pairs": [{
                        "request": {
                            "destination": {"exactMatch": "example.com"},
                            "path": {"exactMatch": "/a"}
                        },
                        "response": {"status": 200, "body": "ok"}
                    }],
                    "globalActions": {"delays": []}
                },
                "meta": {"schemaVersion": "v3"}
            }"#,
        )
        .unwrap();

        assert_eq!(view.data.pairs.len(), 1);
        let request = &view.data.pairs[0].request;
        assert_eq!(
            request.destination.as_ref().unwrap().exact_match.as_deref(),
            Some("example.com")
        );
    }

    #[test]
    fn test_v1_scalar_requests_upgrade_to_exact_match() {
        let view = SimulationView::parse(
            r#"{
                "data": {
                    "pairs": [{
                        "request": {
                            "path": "/a",
                            "method": "GET",
                            "destination": "example.com",
                            "scheme": "http",
                            "query": "b=2&a=1",
                            "body": ""
                        },
                        "response": {"status": 201, "body": "created"}
                    }]
                },
                "meta": {"schemaVersion": "v1"}
            }"#,
        )
        .unwrap();

        assert_eq!(view.meta.schema_version, "v3");
        let request = &view.data.pairs[0].request;
        assert_eq!(
            request.path.as_ref().unwrap().exact_match.as_deref(),
            Some("/a")
        );
        // Queries are canonicalized on upgrade.
        assert_eq!(
            request.query.as_ref().unwrap().exact_match.as_deref(),
            Some("a=1&b=2")
        );
    }

    #[test]
    fn test_v1_template_requests_upgrade_to_glob_match() {
        let view = SimulationView::parse(
            r#"{
                "data": {
                    "pairs": [{
                        "request": {"requestType": "template", "path": "/api/*"},
                        "response": {"status": 200, "body": "ok"}
                    }]
                },
                "meta": {"schemaVersion": "v1"}
            }"#,
        )
        .unwrap();

        let request = &view.data.pairs[0].request;
        assert_eq!(
            request.path.as_ref().unwrap().glob_match.as_deref(),
            Some("/api/*")
        );
        assert!(request.path.as_ref().unwrap().exact_match.is_none());
    }

    #[test]
    fn test_v2_query_exact_match_is_percent_decoded() {
        let view = SimulationView::parse(
            r#"{
                "data": {
                    "pairs": [{
                        "request": {
                            "query": {"exactMatch": "q=10%20Downing%20Street%20London"}
                        },
                        "response": {"status": 200, "body": "ok"}
                    }]
                },
                "meta": {"schemaVersion": "v2"}
            }"#,
        )
        .unwrap();

        assert_eq!(view.meta.schema_version, "v3");
        let request = &view.data.pairs[0].request;
        assert_eq!(
            request.query.as_ref().unwrap().exact_match.as_deref(),
            Some("q=10 Downing Street London")
        );
    }

    #[test]
    fn test_v2_query_glob_match_is_percent_decoded() {
        let view = SimulationView::parse(
            r#"{
                "data": {
                    "pairs": [{
                        "request": {
                            "query": {"globMatch": "q=*%20London"}
                        },
                        "response": {"status": 200, "body": "ok"}
                    }]
                },
                "meta": {"schemaVersion": "v2"}
            }"#,
        )
        .unwrap();

        let request = &view.data.pairs[0].request;
        assert_eq!(
            request.query.as_ref().unwrap().glob_match.as_deref(),
            Some("q=* London")
        );
    }

    #[test]
    fn test_v2_non_query_matchers_pass_through_unchanged() {
        let view = SimulationView::parse(
            r#"{
                "data": {
                    "pairs": [{
                        "request": {
                            "path": {"exactMatch": "/a%20b"}
                        },
                        "response": {"status": 200, "body": "ok"}
                    }]
                },
                "meta": {"schemaVersion": "v2"}
            }"#,
        )
        .unwrap();

        let request = &view.data.pairs[0].request;
        assert_eq!(
            request.path.as_ref().unwrap().exact_match.as_deref(),
            Some("/a%20b")
        );
    }

    #[test]
    fn test_import_rejects_bad_base64_body() {
        let view = SimulationView::parse(
            r#"{
                "data": {
                    "pairs": [{
                        "request": {},
                        "response": {"status": 200, "body": "!!!", "encodedBody": true}
                    }]
                },
                "meta": {"schemaVersion": "v3"}
            }"#,
        )
        .unwrap();

        assert!(view.into_simulation_parts().is_err());
    }

    #[test]
    fn test_export_import_roundtrip() {
        let mut simulation = Simulation::new();
        simulation.add_pair(RequestMatcherResponsePair {
            request: RequestMatcher {
                destination: Some(RequestFieldMatchers::exact("example.com")),
                ..Default::default()
            },
            response: ResponseDetails {
                status: 200,
                body: b"ok".to_vec(),
                ..Default::default()
            },
        });

        let exported = serde_json::to_string(&SimulationView::from_simulation(&simulation)).unwrap();
        let reimported = SimulationView::parse(&exported).unwrap();
        let (pairs, _) = reimported.into_simulation_parts().unwrap();

        assert_eq!(pairs, simulation.pairs().to_vec());
    }

    #[test]
    fn test_binary_body_survives_export_import() {
        let mut simulation = Simulation::new();
        simulation.add_pair(RequestMatcherResponsePair {
            request: RequestMatcher::default(),
            response: ResponseDetails {
                status: 200,
                body: vec![0x89, 0x50, 0x4e, 0x47, 0x00, 0xff],
                ..Default::default()
            },
        });

        let exported = serde_json::to_string(&SimulationView::from_simulation(&simulation)).unwrap();
        let reimported = SimulationView::parse(&exported).unwrap();
        assert!(reimported.data.pairs[0].response.encoded_body);

        let (pairs, _) = reimported.into_simulation_parts().unwrap();
        assert_eq!(pairs[0].response.body, vec![0x89, 0x50, 0x4e, 0x47, 0x00, 0xff]);
    }
}
