//! Modify mode: forward upstream, run middleware once over the exchange,
//! and return whatever the middleware produced. Nothing is recorded.

use crate::engine::Hoverfly;
use crate::middleware::MiddlewarePayload;
use crate::models::{RequestDetails, ResponseDetails};
use crate::modes::ModeError;
use std::collections::HashMap;

pub async fn process(
    hoverfly: &Hoverfly,
    request: &RequestDetails,
) -> Result<ResponseDetails, ModeError> {
    let response = hoverfly.do_request(request).await?;

    let payload = MiddlewarePayload {
        request: request.clone(),
        response,
        state: HashMap::new(),
    };
    Ok(hoverfly.apply_middleware(payload).await.response)
}
