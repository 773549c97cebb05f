//! Admin API wire types and response helpers.

use crate::modes::ModeArgumentsView;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeView {
    pub mode: String,
    #[serde(default)]
    pub arguments: ModeArgumentsView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationView {
    pub destination: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiddlewareView {
    #[serde(default)]
    pub binary: String,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub remote: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageView {
    pub usage: CountersView,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountersView {
    pub counters: HashMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HoverflyView {
    pub destination: String,
    pub middleware: MiddlewareView,
    pub mode: String,
    pub arguments: ModeArgumentsView,
    pub usage: CountersView,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogsView {
    pub logs: Vec<crate::logs::LogEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffView {
    pub diff: Vec<DiffGroupView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffGroupView {
    pub request: crate::modes::diff::SimpleRequestView,
    pub diff_reports: Vec<crate::modes::diff::DiffReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorView {
    pub error: String,
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let payload = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(payload)))
        .expect("json response is valid")
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    json_response(
        status,
        &ErrorView {
            error: message.into(),
        },
    )
}

pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

pub fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "text/plain")
        .body(Full::new(Bytes::from(body)))
        .expect("text response is valid")
}
