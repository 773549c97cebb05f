//! Core data model: normalized requests/responses, the simulation store,
//! response delays and the simulation wire format.

mod delay;
mod request;
mod response;
mod simulation;
mod views;

/// Serde view of raw body bytes as a JSON string. Bodies are bytes in
/// memory; on the middleware wire they travel as text.
pub(crate) mod body_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&String::from_utf8_lossy(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        Ok(String::deserialize(deserializer)?.into_bytes())
    }
}

pub use delay::{ResponseDelay, ResponseDelayList};
pub use request::{canonical_header_name, canonicalize_query, RequestDetails};
pub use response::ResponseDetails;
pub use simulation::{
    JsonPathMatch, RequestFieldMatchers, RequestMatcher, RequestMatcherResponsePair, Simulation,
};
pub use views::{
    DelayView, GlobalActionsView, MetaView, PairView, RequestMatcherView, ResponseView,
    SimulationImportError, SimulationView, HOVERFLY_VERSION, SCHEMA_V3,
};
