//! The mode state machine.
//!
//! The active mode is a tagged value dispatched with a total match; each
//! variant owns its per-mode arguments. `process` returns either the
//! response to serve or a `ModeError` carrying the HTTP status and body the
//! client should see.

pub mod capture;
pub mod diff;
pub mod modify;
pub mod simulate;
pub mod spy;
pub mod synthesize;

use crate::engine::Hoverfly;
use crate::models::{RequestDetails, ResponseDetails};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SIMULATE: &str = "simulate";
pub const CAPTURE: &str = "capture";
pub const MODIFY: &str = "modify";
pub const SYNTHESIZE: &str = "synthesize";
pub const DIFF: &str = "diff";
pub const SPY: &str = "spy";

pub const MODE_NAMES: &[&str] = &[SIMULATE, CAPTURE, MODIFY, SYNTHESIZE, DIFF, SPY];

/// The active behavior of the proxy pipeline, with per-mode arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Simulate,
    Capture { headers_whitelist: Vec<String> },
    Modify,
    Synthesize,
    Diff { headers_blacklist: Vec<String> },
    Spy,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Simulate
    }
}

/// Mode arguments as carried on the admin wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeArgumentsView {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers_whitelist: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers_blacklist: Vec<String>,
}

impl Mode {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Simulate => SIMULATE,
            Mode::Capture { .. } => CAPTURE,
            Mode::Modify => MODIFY,
            Mode::Synthesize => SYNTHESIZE,
            Mode::Diff { .. } => DIFF,
            Mode::Spy => SPY,
        }
    }

    /// Parse a mode-change command; unknown names are a configuration error.
    pub fn from_name(name: &str, arguments: ModeArgumentsView) -> Result<Mode, ModeError> {
        match name {
            SIMULATE => Ok(Mode::Simulate),
            CAPTURE => Ok(Mode::Capture {
                headers_whitelist: arguments.headers_whitelist,
            }),
            MODIFY => Ok(Mode::Modify),
            SYNTHESIZE => Ok(Mode::Synthesize),
            DIFF => Ok(Mode::Diff {
                headers_blacklist: arguments.headers_blacklist,
            }),
            SPY => Ok(Mode::Spy),
            other => Err(ModeError::bad_request(format!(
                "Not a valid mode: {other}"
            ))),
        }
    }

    pub fn arguments(&self) -> ModeArgumentsView {
        match self {
            Mode::Capture { headers_whitelist } => ModeArgumentsView {
                headers_whitelist: headers_whitelist.clone(),
                ..Default::default()
            },
            Mode::Diff { headers_blacklist } => ModeArgumentsView {
                headers_blacklist: headers_blacklist.clone(),
                ..Default::default()
            },
            _ => ModeArgumentsView::default(),
        }
    }
}

/// An error to be rendered as an HTTP response to the proxied client.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ModeError {
    pub status: u16,
    pub message: String,
}

impl ModeError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ModeError {
            status: 400,
            message: message.into(),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ModeError {
            status: 502,
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ModeError {
            status: 503,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ModeError {
            status: 500,
            message: message.into(),
        }
    }

    /// The textual body clients see on a pipeline failure.
    pub fn body(&self) -> String {
        format!(
            "Hoverfly Error!\n\nThere was an error when processing the request\n\nGot error: {}",
            self.message
        )
    }
}

/// Dispatch a request through the given mode.
pub async fn process(
    mode: &Mode,
    hoverfly: &Hoverfly,
    request: &RequestDetails,
) -> Result<ResponseDetails, ModeError> {
    match mode {
        Mode::Simulate => simulate::process(hoverfly, request).await,
        Mode::Capture { headers_whitelist } => {
            capture::process(hoverfly, request, headers_whitelist).await
        }
        Mode::Modify => modify::process(hoverfly, request).await,
        Mode::Synthesize => synthesize::process(hoverfly, request).await,
        Mode::Diff { headers_blacklist } => {
            diff::process(hoverfly, request, headers_blacklist).await
        }
        Mode::Spy => spy::process(hoverfly, request).await,
    }
}
