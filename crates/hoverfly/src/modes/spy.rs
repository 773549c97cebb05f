//! Spy mode: serve from the simulation when a match exists, fall back to
//! the real destination otherwise. Nothing is recorded.

use crate::engine::Hoverfly;
use crate::models::{RequestDetails, ResponseDetails};
use crate::modes::ModeError;
use tracing::debug;

pub async fn process(
    hoverfly: &Hoverfly,
    request: &RequestDetails,
) -> Result<ResponseDetails, ModeError> {
    match hoverfly.get_response(request).await {
        Ok(simulated) => Ok(simulated),
        Err(_) => {
            debug!(
                destination = %request.destination,
                path = %request.path,
                "no simulation match, spying on the real service"
            );
            hoverfly.do_request(request).await
        }
    }
}
