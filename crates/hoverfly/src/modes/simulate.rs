//! Simulate mode: serve responses from the simulation store.

use crate::engine::Hoverfly;
use crate::models::{RequestDetails, ResponseDetails};
use crate::modes::ModeError;

pub async fn process(
    hoverfly: &Hoverfly,
    request: &RequestDetails,
) -> Result<ResponseDetails, ModeError> {
    hoverfly.get_response(request).await
}
