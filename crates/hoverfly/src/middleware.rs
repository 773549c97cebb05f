//! Out-of-process middleware execution.
//!
//! Middleware receives the full pipeline payload (request, response, state)
//! as JSON and returns the same shape; whatever it returns replaces the
//! in-flight pair. Two transports exist: a local subprocess fed on stdin,
//! and a remote HTTP endpoint POSTed to. Middleware is best-effort: any
//! failure leaves the original payload in play.

use crate::models::{RequestDetails, ResponseDetails};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("Middleware process failed: {0}")]
    Process(String),
    #[error("Middleware returned malformed JSON: {0}")]
    MalformedOutput(String),
    #[error("Remote middleware returned status {0}")]
    RemoteStatus(u16),
    #[error("Remote middleware unreachable: {0}")]
    RemoteTransport(String),
}

/// The JSON document exchanged with middleware.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MiddlewarePayload {
    #[serde(default)]
    pub request: RequestDetails,
    #[serde(default)]
    pub response: ResponseDetails,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub state: HashMap<String, String>,
}

/// Middleware configuration: local binary (+ optional script file) or a
/// remote HTTP endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Middleware {
    Local {
        binary: String,
        script_path: Option<String>,
    },
    Remote {
        url: String,
    },
}

impl Middleware {
    pub async fn execute(
        &self,
        payload: MiddlewarePayload,
        client: &reqwest::Client,
    ) -> Result<MiddlewarePayload, MiddlewareError> {
        match self {
            Middleware::Local {
                binary,
                script_path,
            } => execute_locally(binary, script_path.as_deref(), payload).await,
            Middleware::Remote { url } => execute_remotely(url, payload, client).await,
        }
    }
}

/// Spawn `binary [script]`, feed the payload on stdin, parse stdout.
async fn execute_locally(
    binary: &str,
    script_path: Option<&str>,
    payload: MiddlewarePayload,
) -> Result<MiddlewarePayload, MiddlewareError> {
    let input =
        serde_json::to_vec(&payload).map_err(|e| MiddlewareError::MalformedOutput(e.to_string()))?;

    // The binary setting may carry its own arguments ("go run mw.go").
    let mut parts = binary.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| MiddlewareError::Process("middleware binary is empty".to_string()))?;

    let mut command = Command::new(program);
    command.args(parts);
    if let Some(script) = script_path {
        command.arg(script);
    }

    let mut child = command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| MiddlewareError::Process(e.to_string()))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(&input)
            .await
            .map_err(|e| MiddlewareError::Process(e.to_string()))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| MiddlewareError::Process(e.to_string()))?;

    if !output.status.success() {
        return Err(MiddlewareError::Process(format!(
            "exit {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    debug!(middleware = binary, "local middleware completed");
    serde_json::from_slice(&output.stdout)
        .map_err(|e| MiddlewareError::MalformedOutput(e.to_string()))
}

/// POST the payload as JSON; only a 200 with a parseable body is applied.
async fn execute_remotely(
    url: &str,
    payload: MiddlewarePayload,
    client: &reqwest::Client,
) -> Result<MiddlewarePayload, MiddlewareError> {
    let response = client
        .post(url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| MiddlewareError::RemoteTransport(e.to_string()))?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(MiddlewareError::RemoteStatus(response.status().as_u16()));
    }

    response
        .json::<MiddlewarePayload>()
        .await
        .map_err(|e| MiddlewareError::MalformedOutput(e.to_string()))
}
