//! The Hoverfly engine: owns the simulation store, the active mode, the
//! destination filter, the middleware configuration, the Simulate cache and
//! the upstream HTTP client. The proxy listener and the admin API both talk
//! to the engine; nothing else holds shared state.

use crate::cache::{fingerprint, MatchCache};
use crate::config::Configuration;
use crate::metrics;
use crate::middleware::{Middleware, MiddlewarePayload};
use crate::models::{
    RequestDetails, RequestMatcherResponsePair, ResponseDetails, Simulation, SimulationImportError,
    SimulationView,
};
use crate::modes::diff::{DiffReport, SimpleRequestView};
use crate::modes::{self, Mode, ModeError};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

pub struct Hoverfly {
    config: Configuration,
    simulation: RwLock<Simulation>,
    mode: RwLock<Mode>,
    destination: RwLock<Regex>,
    middleware: RwLock<Option<Middleware>>,
    cache: MatchCache,
    http_client: reqwest::Client,
    diff_store: Mutex<Vec<(SimpleRequestView, Vec<DiffReport>)>>,
}

impl Hoverfly {
    pub fn new(config: Configuration) -> Result<Hoverfly, anyhow::Error> {
        config.validate()?;

        let destination = Regex::new(&config.destination)?;

        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if !config.tls_verification {
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder = match &config.upstream_proxy {
            Some(proxy) => builder.proxy(reqwest::Proxy::all(proxy)?),
            None => builder.no_proxy(),
        };
        let http_client = builder.build()?;

        Ok(Hoverfly {
            config,
            simulation: RwLock::new(Simulation::new()),
            mode: RwLock::new(Mode::Simulate),
            destination: RwLock::new(destination),
            middleware: RwLock::new(None),
            cache: MatchCache::new(),
            http_client,
            diff_store: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http_client
    }

    pub fn simulation(&self) -> &RwLock<Simulation> {
        &self.simulation
    }

    pub fn cache(&self) -> &MatchCache {
        &self.cache
    }

    // ===== Mode =====

    pub fn mode(&self) -> Mode {
        self.mode.read().clone()
    }

    pub fn set_mode(&self, mode: Mode) -> Result<(), ModeError> {
        if matches!(mode, Mode::Capture { .. }) && self.config.webserver {
            return Err(ModeError::bad_request(
                "Capture mode cannot be used when running as a webserver",
            ));
        }
        info!(mode = mode.name(), "mode changed");
        *self.mode.write() = mode;
        Ok(())
    }

    // ===== Destination filter =====

    pub fn destination(&self) -> String {
        self.destination.read().as_str().to_string()
    }

    pub fn set_destination(&self, pattern: &str) -> Result<(), ModeError> {
        let compiled = Regex::new(pattern)
            .map_err(|e| ModeError::bad_request(format!("Invalid destination regex: {e}")))?;
        info!(destination = pattern, "destination filter changed");
        *self.destination.write() = compiled;
        Ok(())
    }

    /// Should this request enter the pipeline? Non-matching hosts pass
    /// through verbatim in every mode. A filter containing `/` is evaluated
    /// against host+path instead of the bare host.
    pub fn is_destination_matched(&self, request: &RequestDetails) -> bool {
        let filter = self.destination.read();
        if filter.as_str().contains('/') {
            filter.is_match(&format!("{}{}", request.destination, request.path))
        } else {
            filter.is_match(&request.destination)
        }
    }

    // ===== Middleware =====

    pub fn middleware(&self) -> Option<Middleware> {
        self.middleware.read().clone()
    }

    pub fn set_middleware(&self, middleware: Option<Middleware>) {
        *self.middleware.write() = middleware;
    }

    pub fn is_middleware_set(&self) -> bool {
        self.middleware.read().is_some()
    }

    /// Run middleware over the payload when configured. Middleware is
    /// best-effort: failures log a warning and leave the payload untouched.
    pub async fn apply_middleware(&self, payload: MiddlewarePayload) -> MiddlewarePayload {
        let middleware = match self.middleware() {
            Some(middleware) => middleware,
            None => return payload,
        };
        match middleware.execute(payload.clone(), &self.http_client).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(error = %e, "middleware failed, continuing with original payload");
                payload
            }
        }
    }

    // ===== Request pipeline =====

    /// Dispatch a request through the active mode, count it, and apply any
    /// response delay. Errors become HTTP error responses here; delays never
    /// apply to errors or to Capture mode.
    pub async fn process_request(&self, request: &RequestDetails) -> ResponseDetails {
        let mode = self.mode();

        match modes::process(&mode, self, request).await {
            Ok(response) => {
                metrics::count_request(mode.name());
                if !matches!(mode, Mode::Capture { .. }) {
                    self.apply_delays(request, &response).await;
                }
                response
            }
            Err(error) => {
                warn!(
                    mode = mode.name(),
                    status = error.status,
                    error = %error.message,
                    "request failed"
                );
                ResponseDetails {
                    status: error.status,
                    body: error.body().into_bytes(),
                    ..Default::default()
                }
            }
        }
    }

    /// A response's own fixed delay is additive with the first matching
    /// global delay rule.
    async fn apply_delays(&self, request: &RequestDetails, response: &ResponseDetails) {
        if let Some(ms) = response.fixed_delay {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
        let delay = self
            .simulation
            .read()
            .response_delays
            .get_delay(request)
            .cloned();
        if let Some(delay) = delay {
            delay.execute().await;
        }
    }

    /// Forward a request to the real destination. Redirects are returned to
    /// the caller untouched; transport failures surface as 502s.
    pub async fn do_request(&self, request: &RequestDetails) -> Result<ResponseDetails, ModeError> {
        let mut url = request.base_url();
        if !request.query.is_empty() {
            let encoded: Vec<String> = request
                .query
                .split('&')
                .map(|pair| {
                    let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                    format!("{}={}", urlencoding::encode(k), urlencoding::encode(v))
                })
                .collect();
            url = format!("{url}?{}", encoded.join("&"));
        }

        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| ModeError::bad_gateway(format!("Invalid method: {e}")))?;

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, values) in &request.headers {
            if name.eq_ignore_ascii_case("host") || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            for value in values {
                if let (Ok(name), Ok(value)) = (
                    reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                    reqwest::header::HeaderValue::from_str(value),
                ) {
                    headers.append(name, value);
                }
            }
        }

        let upstream = self
            .http_client
            .request(method, &url)
            .headers(headers)
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| ModeError::bad_gateway(format!("There was an error when forwarding the request to the intended destination: {e}")))?;

        let status = upstream.status().as_u16();
        let mut response_headers: HashMap<String, Vec<String>> = HashMap::new();
        for (name, value) in upstream.headers() {
            // Hop-by-hop headers do not survive re-framing of the body.
            if matches!(
                name.as_str(),
                "transfer-encoding" | "connection" | "keep-alive" | "proxy-connection"
            ) {
                continue;
            }
            if let Ok(value) = value.to_str() {
                response_headers
                    .entry(crate::models::canonical_header_name(name.as_str()))
                    .or_default()
                    .push(value.to_string());
            }
        }

        let body = upstream
            .bytes()
            .await
            .map_err(|e| ModeError::bad_gateway(format!("There was an error when reading the upstream response body: {e}")))?;

        Ok(ResponseDetails {
            status,
            body: body.to_vec(),
            headers: response_headers,
            ..Default::default()
        })
    }

    /// The Simulate lookup shared by Simulate and Spy: cache, matcher,
    /// state transition, templating, middleware, cache fill.
    pub async fn get_response(
        &self,
        request: &RequestDetails,
    ) -> Result<ResponseDetails, ModeError> {
        let matched_headers = self.simulation.read().matched_header_names();
        let key = fingerprint(request, &matched_headers);

        if !self.config.cache_disabled {
            if let Some(cached) = self.cache.get(&key) {
                return Ok(cached);
            }
        }

        let (mut response, state_snapshot) = {
            let mut simulation = self.simulation.write();
            let pair = crate::matching::match_request(request, self.config.webserver, &simulation)
                .map_err(|e| {
                    if let Some(closest) = &e.closest_miss {
                        warn!(
                            missed = %closest.describe(),
                            matched_fields = closest.matched_field_count,
                            "closest miss"
                        );
                    }
                    ModeError::bad_gateway(e.to_string())
                })?;
            let response = pair.response.clone();
            let transitions = response.transitions_state.clone();
            if !transitions.is_empty() {
                simulation.transition_state(&transitions);
            }
            (response, simulation.state.clone())
        };

        if response.templated {
            response.body = crate::templating::render(&response.body_str(), request)
                .map_err(|e| ModeError::internal(e.to_string()))?
                .into_bytes();
        }

        if self.is_middleware_set() {
            let payload = MiddlewarePayload {
                request: request.clone(),
                response: response.clone(),
                state: state_snapshot,
            };
            response = self.apply_middleware(payload).await.response;
        }

        if !self.config.cache_disabled {
            self.cache.put(key, response.clone());
        }

        Ok(response)
    }

    // ===== Store mutation =====

    /// Record a captured pair. Structurally repeated captures are sequenced
    /// so replay walks them in capture order.
    pub fn save_pair(&self, pair: RequestMatcherResponsePair) {
        let mut simulation = self.simulation.write();
        let repeated = simulation
            .pairs()
            .iter()
            .any(|saved| saved.request.same_shape(&pair.request));
        if repeated {
            simulation.add_pair_in_sequence(pair);
        } else {
            simulation.add_pair(pair);
        }
        drop(simulation);
        self.cache.flush();
    }

    pub fn import(&self, view: SimulationView) -> Result<(), SimulationImportError> {
        let (pairs, delays) = view.into_simulation_parts()?;

        let mut simulation = self.simulation.write();
        simulation.replace_pairs(pairs);
        simulation.response_delays = delays;
        simulation.state.clear();
        // Sequenced matchers start at position 1 after an import.
        let sequence_keys: Vec<String> = simulation
            .pairs()
            .iter()
            .flat_map(|p| p.request.requires_state.keys())
            .filter(|k| k.starts_with("sequence"))
            .cloned()
            .collect();
        for key in sequence_keys {
            simulation.state.entry(key).or_insert_with(|| "1".to_string());
        }
        drop(simulation);

        self.cache.flush();
        Ok(())
    }

    pub fn export(&self) -> SimulationView {
        SimulationView::from_simulation(&self.simulation.read())
    }

    pub fn wipe_simulation(&self) {
        self.simulation.write().delete_pairs();
        self.cache.flush();
    }

    // ===== Diff store =====

    pub fn add_diff(&self, request: SimpleRequestView, report: DiffReport) {
        let mut store = self.diff_store.lock();
        match store.iter_mut().find(|(key, _)| *key == request) {
            Some((_, reports)) => reports.push(report),
            None => store.push((request, vec![report])),
        }
    }

    pub fn diffs(&self) -> Vec<(SimpleRequestView, Vec<DiffReport>)> {
        self.diff_store.lock().clone()
    }

    pub fn clear_diffs(&self) {
        self.diff_store.lock().clear();
    }

    // ===== Usage =====

    pub fn usage(&self) -> HashMap<String, u64> {
        metrics::counters(modes::MODE_NAMES)
    }
}
