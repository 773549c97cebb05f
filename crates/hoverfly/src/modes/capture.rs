//! Capture mode: forward upstream and record the exchange as a pair.

use crate::engine::Hoverfly;
use crate::middleware::MiddlewarePayload;
use crate::models::{
    RequestDetails, RequestFieldMatchers, RequestMatcher, RequestMatcherResponsePair,
    ResponseDetails,
};
use crate::modes::ModeError;
use std::collections::HashMap;
use tracing::debug;

pub async fn process(
    hoverfly: &Hoverfly,
    request: &RequestDetails,
    headers_whitelist: &[String],
) -> Result<ResponseDetails, ModeError> {
    let response = hoverfly.do_request(request).await?;

    let mut pair = RequestMatcherResponsePair {
        request: build_matcher(request, headers_whitelist),
        response: response.clone(),
    };

    // Middleware may rewrite the pair before it enters the store.
    if hoverfly.is_middleware_set() {
        let payload = MiddlewarePayload {
            request: request.clone(),
            response: pair.response.clone(),
            state: HashMap::new(),
        };
        let updated = hoverfly.apply_middleware(payload).await;
        pair.request = build_matcher(&updated.request, headers_whitelist);
        pair.response = updated.response;
    }

    debug!(
        destination = %request.destination,
        path = %request.path,
        "captured request"
    );
    hoverfly.save_pair(pair);

    Ok(response)
}

/// Exact matchers for every scalar field; the headers whitelist decides
/// which request headers become matchers (`*` keeps them all).
fn build_matcher(request: &RequestDetails, headers_whitelist: &[String]) -> RequestMatcher {
    let keep_all = headers_whitelist.iter().any(|h| h == "*");
    let headers: HashMap<String, RequestFieldMatchers> = request
        .headers
        .iter()
        .filter(|(name, _)| {
            keep_all
                || headers_whitelist
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(name))
        })
        .map(|(name, values)| (name.clone(), RequestFieldMatchers::exact(values.join(";"))))
        .collect();

    RequestMatcher {
        scheme: Some(RequestFieldMatchers::exact(&request.scheme)),
        method: Some(RequestFieldMatchers::exact(&request.method)),
        destination: Some(RequestFieldMatchers::exact(&request.destination)),
        path: Some(RequestFieldMatchers::exact(&request.path)),
        query: Some(RequestFieldMatchers::exact(&request.query)),
        body: Some(RequestFieldMatchers::exact(request.body_str().into_owned())),
        headers,
        requires_state: HashMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_headers() -> RequestDetails {
        let mut request = RequestDetails {
            scheme: "http".to_string(),
            method: "GET".to_string(),
            destination: "svc.local".to_string(),
            path: "/x".to_string(),
            query: String::new(),
            body: Vec::new(),
            ..Default::default()
        };
        request
            .headers
            .insert("Authorization".to_string(), vec!["token".to_string()]);
        request
            .headers
            .insert("Accept".to_string(), vec!["*/*".to_string()]);
        request
    }

    #[test]
    fn test_matcher_is_exact_on_all_scalar_fields() {
        let matcher = build_matcher(&request_with_headers(), &[]);
        assert_eq!(
            matcher.method.unwrap().exact_match.as_deref(),
            Some("GET")
        );
        assert_eq!(
            matcher.destination.unwrap().exact_match.as_deref(),
            Some("svc.local")
        );
        assert_eq!(matcher.path.unwrap().exact_match.as_deref(), Some("/x"));
        assert_eq!(matcher.scheme.unwrap().exact_match.as_deref(), Some("http"));
        assert_eq!(matcher.query.unwrap().exact_match.as_deref(), Some(""));
        assert!(matcher.headers.is_empty());
    }

    #[test]
    fn test_headers_whitelist_selects_matchers() {
        let matcher = build_matcher(&request_with_headers(), &["authorization".to_string()]);
        assert_eq!(matcher.headers.len(), 1);
        assert_eq!(
            matcher.headers["Authorization"].exact_match.as_deref(),
            Some("token")
        );
    }

    #[test]
    fn test_star_whitelist_keeps_all_headers() {
        let matcher = build_matcher(&request_with_headers(), &["*".to_string()]);
        assert_eq!(matcher.headers.len(), 2);
    }
}
