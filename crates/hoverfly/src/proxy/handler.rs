//! Request handling: normalize the incoming hyper request, apply the
//! destination filter, and dispatch into the mode pipeline.

use crate::engine::Hoverfly;
use crate::models::{RequestDetails, ResponseDetails};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::warn;

/// Serve one request. `scheme` is `https` inside a MITM tunnel, `http`
/// otherwise; `tunnel_authority` carries the CONNECT target when present.
pub async fn handle_request(
    hoverfly: Arc<Hoverfly>,
    req: Request<Incoming>,
    scheme: &str,
    tunnel_authority: Option<String>,
) -> Response<Full<Bytes>> {
    let webserver = hoverfly.config().webserver;

    let method = req.method().to_string();
    let uri = req.uri().clone();
    let path = uri.path().to_string();
    let query = uri.query().map(|q| q.to_string());

    // Proxy mode sees absolute-form URIs (or a CONNECT tunnel target);
    // webserver mode resolves the destination from the Host header.
    let authority = tunnel_authority
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .or_else(|| {
            req.headers()
                .get(hyper::header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(|h| h.to_string())
        });
    let authority = match authority {
        Some(authority) => authority,
        None => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Could not determine the destination of the request",
            )
        }
    };

    let headers = req.headers().clone();
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return error_response(StatusCode::BAD_REQUEST, "Could not read request body");
        }
    };

    let details = RequestDetails::new(
        scheme,
        &method,
        &authority,
        &path,
        query.as_deref(),
        &headers,
        &body,
    );

    // Hosts outside the destination filter pass through untouched.
    if !webserver && !hoverfly.is_destination_matched(&details) {
        return match hoverfly.do_request(&details).await {
            Ok(response) => to_http_response(response, false),
            Err(error) => error_response(
                StatusCode::BAD_GATEWAY,
                &format!("Could not reach the destination: {}", error.message),
            ),
        };
    }

    let response = hoverfly.process_request(&details).await;
    to_http_response(response, true)
}

/// Render a pipeline response; `stamp` adds the `Hoverfly: Was-Here` marker.
fn to_http_response(response: ResponseDetails, stamp: bool) -> Response<Full<Bytes>> {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut builder = Response::builder().status(status);
    for (name, values) in &response.headers {
        // The body is re-framed; hyper computes the length itself.
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        for value in values {
            builder = builder.header(name, value);
        }
    }
    if stamp {
        builder = builder.header("Hoverfly", "Was-Here");
    }

    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|_| {
            Response::new(Full::new(Bytes::from_static(b"Hoverfly Error!")))
        })
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(format!(
            "Hoverfly Error!\n\n{message}"
        ))))
        .expect("static error response is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_http_response_stamps_hoverfly_header() {
        let response = to_http_response(
            ResponseDetails {
                status: 201,
                body: b"hi".to_vec(),
                ..Default::default()
            },
            true,
        );
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers().get("Hoverfly").unwrap(), "Was-Here");
    }

    #[test]
    fn test_passthrough_response_is_unstamped() {
        let response = to_http_response(
            ResponseDetails {
                status: 200,
                ..Default::default()
            },
            false,
        );
        assert!(response.headers().get("Hoverfly").is_none());
    }

    #[test]
    fn test_invalid_status_maps_to_500() {
        let response = to_http_response(
            ResponseDetails {
                status: 0,
                ..Default::default()
            },
            true,
        );
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
