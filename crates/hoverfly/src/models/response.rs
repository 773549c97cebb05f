//! Stored response details and their base64 wire form.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A response held in the simulation store (or captured from upstream).
///
/// `body` carries the raw bytes; `encoded_body` records whether the wire
/// form in a simulation file is base64 of those bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDetails {
    pub status: u16,
    #[serde(default, with = "super::body_serde")]
    pub body: Vec<u8>,
    #[serde(default)]
    pub encoded_body: bool,
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub templated: bool,
    #[serde(default)]
    pub transitions_state: HashMap<String, String>,
    #[serde(default)]
    pub fixed_delay: Option<u64>,
}

impl ResponseDetails {
    /// Decode a wire body into raw bytes, honouring the `encodedBody` flag.
    /// Returns an error string naming the offending body on bad base64.
    pub fn decode_body(body: &str, encoded: bool) -> Result<Vec<u8>, String> {
        if !encoded {
            return Ok(body.as_bytes().to_vec());
        }
        BASE64_STANDARD
            .decode(body)
            .map_err(|e| format!("Failed to decode base64 encoded body: {e}"))
    }

    /// Case-insensitive header lookup returning the joined value list.
    pub fn header_join(&self, name: &str) -> Option<String> {
        let wanted = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == wanted)
            .map(|(_, v)| v.join(";"))
    }

    /// UTF-8 view of the body for diffing and templating; the raw bytes
    /// stay authoritative for serving.
    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// The wire form of this body: the text itself when it is valid UTF-8,
    /// base64 of the raw bytes otherwise.
    pub fn encode_body(&self) -> (String, bool) {
        match std::str::from_utf8(&self.body) {
            Ok(text) => (text.to_string(), false),
            Err(_) => (BASE64_STANDARD.encode(&self.body), true),
        }
    }
}
