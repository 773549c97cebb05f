//! Route dispatch for the admin API.

use super::handlers;
use super::types::not_found;
use crate::engine::Hoverfly;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::sync::Arc;
use tracing::debug;

pub async fn route_request(
    req: Request<Incoming>,
    hoverfly: Arc<Hoverfly>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!(%method, %path, "admin request");

    // `GET /api/v2/logs` honours both Accept and Content-Type for the
    // line-oriented plain text form.
    let wants_plain_text = ["accept", "content-type"].iter().any(|header| {
        req.headers()
            .get(*header)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/plain"))
            .unwrap_or(false)
    });

    let body = req.into_body().collect().await?.to_bytes();

    let mut response = match (&method, path.as_str()) {
        (&Method::GET, "/api/health") => handlers::health(),

        (&Method::GET, "/api/v2/hoverfly") => handlers::hoverfly_view(&hoverfly),
        (&Method::GET, "/api/v2/hoverfly/mode") => handlers::get_mode(&hoverfly),
        (&Method::PUT, "/api/v2/hoverfly/mode") => handlers::put_mode(&hoverfly, &body),
        (&Method::GET, "/api/v2/hoverfly/destination") => handlers::get_destination(&hoverfly),
        (&Method::PUT, "/api/v2/hoverfly/destination") => {
            handlers::put_destination(&hoverfly, &body)
        }
        (&Method::GET, "/api/v2/hoverfly/middleware") => handlers::get_middleware(&hoverfly),
        (&Method::PUT, "/api/v2/hoverfly/middleware") => {
            handlers::put_middleware(&hoverfly, &body)
        }
        (&Method::GET, "/api/v2/hoverfly/usage") => handlers::usage(&hoverfly),

        (&Method::GET, "/api/v2/simulation") => handlers::get_simulation(&hoverfly),
        (&Method::PUT, "/api/v2/simulation") => handlers::put_simulation(&hoverfly, &body),
        (&Method::DELETE, "/api/v2/simulation") => handlers::delete_simulation(&hoverfly),

        (&Method::DELETE, "/api/v2/cache") => handlers::delete_cache(&hoverfly),

        (&Method::GET, "/api/v2/logs") => handlers::get_logs(wants_plain_text),

        (&Method::GET, "/api/v2/diff") => handlers::get_diff(&hoverfly),
        (&Method::DELETE, "/api/v2/diff") => handlers::delete_diff(&hoverfly),

        (&Method::OPTIONS, _) => Response::new(Full::new(Bytes::new())),

        _ => not_found(),
    };

    if hoverfly.config().cors {
        let headers = response.headers_mut();
        headers.insert(
            "Access-Control-Allow-Origin",
            hyper::header::HeaderValue::from_static("*"),
        );
        headers.insert(
            "Access-Control-Allow-Methods",
            hyper::header::HeaderValue::from_static("GET, PUT, POST, DELETE, OPTIONS"),
        );
        headers.insert(
            "Access-Control-Allow-Headers",
            hyper::header::HeaderValue::from_static("Content-Type"),
        );
    }

    Ok(response)
}
