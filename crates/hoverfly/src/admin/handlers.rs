//! Admin API handlers: each mutates or reads the engine and renders a view.

use super::types::*;
use crate::engine::Hoverfly;
use crate::logs::LOG_BUFFER;
use crate::middleware::Middleware;
use crate::models::{SimulationImportError, SimulationView, HOVERFLY_VERSION};
use crate::modes::Mode;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;

// ===== /api/health =====

pub fn health() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &HealthView {
            message: "Hoverfly is healthy".to_string(),
        },
    )
}

// ===== /api/v2/hoverfly =====

pub fn hoverfly_view(hoverfly: &Arc<Hoverfly>) -> Response<Full<Bytes>> {
    let mode = hoverfly.mode();
    json_response(
        StatusCode::OK,
        &HoverflyView {
            destination: hoverfly.destination(),
            middleware: middleware_view(hoverfly),
            mode: mode.name().to_string(),
            arguments: mode.arguments(),
            usage: CountersView {
                counters: hoverfly.usage(),
            },
            version: HOVERFLY_VERSION.to_string(),
        },
    )
}

// ===== /api/v2/hoverfly/mode =====

pub fn get_mode(hoverfly: &Arc<Hoverfly>) -> Response<Full<Bytes>> {
    let mode = hoverfly.mode();
    json_response(
        StatusCode::OK,
        &ModeView {
            mode: mode.name().to_string(),
            arguments: mode.arguments(),
        },
    )
}

pub fn put_mode(hoverfly: &Arc<Hoverfly>, body: &[u8]) -> Response<Full<Bytes>> {
    let view: ModeView = match serde_json::from_slice(body) {
        Ok(view) => view,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Malformed JSON: {e}")),
    };

    let mode = match Mode::from_name(&view.mode, view.arguments) {
        Ok(mode) => mode,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.message),
    };

    match hoverfly.set_mode(mode) {
        Ok(()) => get_mode(hoverfly),
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, e.message),
    }
}

// ===== /api/v2/hoverfly/destination =====

pub fn get_destination(hoverfly: &Arc<Hoverfly>) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &DestinationView {
            destination: hoverfly.destination(),
        },
    )
}

pub fn put_destination(hoverfly: &Arc<Hoverfly>, body: &[u8]) -> Response<Full<Bytes>> {
    let view: DestinationView = match serde_json::from_slice(body) {
        Ok(view) => view,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Malformed JSON: {e}")),
    };

    match hoverfly.set_destination(&view.destination) {
        Ok(()) => get_destination(hoverfly),
        Err(e) => error_response(StatusCode::UNPROCESSABLE_ENTITY, e.message),
    }
}

// ===== /api/v2/hoverfly/middleware =====

fn middleware_view(hoverfly: &Arc<Hoverfly>) -> MiddlewareView {
    match hoverfly.middleware() {
        Some(Middleware::Local {
            binary,
            script_path,
        }) => MiddlewareView {
            binary,
            script: script_path
                .and_then(|path| std::fs::read_to_string(path).ok())
                .unwrap_or_default(),
            remote: String::new(),
        },
        Some(Middleware::Remote { url }) => MiddlewareView {
            remote: url,
            ..Default::default()
        },
        None => MiddlewareView::default(),
    }
}

pub fn get_middleware(hoverfly: &Arc<Hoverfly>) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &middleware_view(hoverfly))
}

pub fn put_middleware(hoverfly: &Arc<Hoverfly>, body: &[u8]) -> Response<Full<Bytes>> {
    let view: MiddlewareView = match serde_json::from_slice(body) {
        Ok(view) => view,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("Malformed JSON: {e}")),
    };

    let middleware = if !view.remote.is_empty() {
        Some(Middleware::Remote { url: view.remote })
    } else if !view.binary.is_empty() {
        let script_path = if view.script.is_empty() {
            None
        } else {
            let path = std::env::temp_dir().join(format!(
                "hoverfly-middleware-{}.script",
                std::process::id()
            ));
            if let Err(e) = std::fs::write(&path, &view.script) {
                return error_response(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    format!("Could not write middleware script: {e}"),
                );
            }
            Some(path.to_string_lossy().into_owned())
        };
        Some(Middleware::Local {
            binary: view.binary,
            script_path,
        })
    } else if !view.script.is_empty() {
        return error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Cannot run a middleware script without a binary",
        );
    } else {
        None
    };

    hoverfly.set_middleware(middleware);
    get_middleware(hoverfly)
}

// ===== /api/v2/hoverfly/usage =====

pub fn usage(hoverfly: &Arc<Hoverfly>) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &UsageView {
            usage: CountersView {
                counters: hoverfly.usage(),
            },
        },
    )
}

// ===== /api/v2/simulation =====

pub fn get_simulation(hoverfly: &Arc<Hoverfly>) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &hoverfly.export())
}

pub fn put_simulation(hoverfly: &Arc<Hoverfly>, body: &[u8]) -> Response<Full<Bytes>> {
    let raw = String::from_utf8_lossy(body);
    let view = match SimulationView::parse(&raw) {
        Ok(view) => view,
        Err(e) => return import_error(e),
    };

    match hoverfly.import(view) {
        Ok(()) => get_simulation(hoverfly),
        Err(e) => import_error(e),
    }
}

pub fn delete_simulation(hoverfly: &Arc<Hoverfly>) -> Response<Full<Bytes>> {
    hoverfly.wipe_simulation();
    get_simulation(hoverfly)
}

fn import_error(error: SimulationImportError) -> Response<Full<Bytes>> {
    error_response(StatusCode::UNPROCESSABLE_ENTITY, error.to_string())
}

// ===== /api/v2/cache =====

pub fn delete_cache(hoverfly: &Arc<Hoverfly>) -> Response<Full<Bytes>> {
    hoverfly.cache().flush();
    json_response(StatusCode::OK, &serde_json::json!({ "cache": null }))
}

// ===== /api/v2/logs =====

pub fn get_logs(wants_plain_text: bool) -> Response<Full<Bytes>> {
    if wants_plain_text {
        text_response(StatusCode::OK, LOG_BUFFER.as_plain_text())
    } else {
        json_response(
            StatusCode::OK,
            &LogsView {
                logs: LOG_BUFFER.snapshot(),
            },
        )
    }
}

// ===== /api/v2/diff =====

pub fn get_diff(hoverfly: &Arc<Hoverfly>) -> Response<Full<Bytes>> {
    let diff = hoverfly
        .diffs()
        .into_iter()
        .map(|(request, diff_reports)| DiffGroupView {
            request,
            diff_reports,
        })
        .collect();
    json_response(StatusCode::OK, &DiffView { diff })
}

pub fn delete_diff(hoverfly: &Arc<Hoverfly>) -> Response<Full<Bytes>> {
    hoverfly.clear_diffs();
    json_response(StatusCode::OK, &DiffView { diff: Vec::new() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    fn engine() -> Arc<Hoverfly> {
        Arc::new(Hoverfly::new(Configuration::default()).unwrap())
    }

    #[test]
    fn test_put_mode_switches_the_engine() {
        let hoverfly = engine();
        let response = put_mode(&hoverfly, br#"{"mode": "capture"}"#);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(hoverfly.mode().name(), "capture");
    }

    #[test]
    fn test_put_mode_rejects_unknown_names() {
        let hoverfly = engine();
        let response = put_mode(&hoverfly, br#"{"mode": "record"}"#);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(hoverfly.mode().name(), "simulate");
    }

    #[test]
    fn test_put_mode_rejects_capture_in_webserver() {
        let hoverfly = Arc::new(
            Hoverfly::new(Configuration {
                webserver: true,
                ..Default::default()
            })
            .unwrap(),
        );
        let response = put_mode(&hoverfly, br#"{"mode": "capture"}"#);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_put_destination_compiles_the_filter() {
        let hoverfly = engine();
        let ok = put_destination(&hoverfly, br#"{"destination": "example\\.com"}"#);
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(hoverfly.destination(), "example\\.com");

        let bad = put_destination(&hoverfly, br#"{"destination": "[unclosed"}"#);
        assert_eq!(bad.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_put_middleware_requires_binary_for_script() {
        let hoverfly = engine();
        let response = put_middleware(&hoverfly, br#"{"script": "print('x')"}"#);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!hoverfly.is_middleware_set());
    }

    #[test]
    fn test_put_middleware_remote_and_unset() {
        let hoverfly = engine();
        let response = put_middleware(&hoverfly, br#"{"remote": "http://localhost:9000"}"#);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(hoverfly.is_middleware_set());

        let cleared = put_middleware(&hoverfly, b"{}");
        assert_eq!(cleared.status(), StatusCode::OK);
        assert!(!hoverfly.is_middleware_set());
    }

    #[test]
    fn test_put_simulation_rejects_missing_schema_version() {
        let hoverfly = engine();
        let response = put_simulation(&hoverfly, br#"{"data": {"pairs": []}}"#);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_simulation_import_then_export() {
        let hoverfly = engine();
        let body = br#"{
            "data": {
                "pairs": [{
                    "request": {"path": {"exactMatch": "/a"}},
                    "response": {"status": 200, "body": "ok"}
                }],
                "globalActions": {"delays": []}
            },
            "meta": {"schemaVersion": "v3"}
        }"#;

        let response = put_simulation(&hoverfly, body);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(hoverfly.simulation().read().pairs().len(), 1);

        let deleted = delete_simulation(&hoverfly);
        assert_eq!(deleted.status(), StatusCode::OK);
        assert!(hoverfly.simulation().read().pairs().is_empty());
    }

    #[test]
    fn test_health_view() {
        let response = health();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
