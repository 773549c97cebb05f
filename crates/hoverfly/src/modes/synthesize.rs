//! Synthesize mode: middleware builds the entire response; nothing is
//! forwarded upstream.

use crate::engine::Hoverfly;
use crate::middleware::MiddlewarePayload;
use crate::models::{RequestDetails, ResponseDetails};
use crate::modes::ModeError;
use std::collections::HashMap;

pub async fn process(
    hoverfly: &Hoverfly,
    request: &RequestDetails,
) -> Result<ResponseDetails, ModeError> {
    let middleware = hoverfly.middleware().ok_or_else(|| {
        ModeError::service_unavailable(
            "Synthesize mode requires middleware to be set",
        )
    })?;

    let payload = MiddlewarePayload {
        request: request.clone(),
        response: ResponseDetails::default(),
        state: HashMap::new(),
    };

    let synthesized = middleware
        .execute(payload, hoverfly.http_client())
        .await
        .map_err(|e| ModeError::service_unavailable(format!("Could not create synthetic response: {e}")))?;

    Ok(synthesized.response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    #[tokio::test]
    async fn test_synthesize_without_middleware_is_503() {
        let hoverfly = Hoverfly::new(Configuration::default()).unwrap();
        let request = RequestDetails {
            method: "GET".to_string(),
            destination: "example.com".to_string(),
            path: "/".to_string(),
            ..Default::default()
        };

        let err = process(&hoverfly, &request).await.unwrap_err();
        assert_eq!(err.status, 503);
    }

    #[tokio::test]
    async fn test_synthesize_returns_middleware_response() {
        use crate::middleware::Middleware;

        let hoverfly = Hoverfly::new(Configuration::default()).unwrap();
        // `cat` echoes the payload, so the synthesized response is the empty
        // response carried in the payload.
        hoverfly.set_middleware(Some(Middleware::Local {
            binary: "cat".to_string(),
            script_path: None,
        }));

        let request = RequestDetails {
            method: "GET".to_string(),
            destination: "example.com".to_string(),
            path: "/".to_string(),
            ..Default::default()
        };

        let response = process(&hoverfly, &request).await.unwrap();
        assert_eq!(response.status, 0);
    }
}
