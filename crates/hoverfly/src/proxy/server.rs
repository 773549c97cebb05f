//! The proxy listener: accept loop, CONNECT interception and the
//! stoppable-listener wrapper.
//!
//! In proxy mode plain requests are dispatched straight into the pipeline
//! and CONNECT is answered with `200 Connection established` followed by a
//! TLS handshake using a leaf minted for the tunnel host. In webserver mode
//! the same port serves as an ordinary HTTP origin and CONNECT is rejected.

use crate::engine::Hoverfly;
use crate::proxy::handler::handle_request;
use crate::proxy::mitm::CertificateAuthority;
use anyhow::Context as AnyhowContext;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Handle returned by `start_proxy`; dropping it leaves the proxy running.
pub struct ProxyHandle {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl ProxyHandle {
    /// Close the accept loop and wait for it to finish. In-flight
    /// connections complete on their own tasks.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Bind the proxy port and spawn the accept loop. Non-blocking; a failure
/// to bind is fatal and reported to the caller.
pub async fn start_proxy(
    hoverfly: Arc<Hoverfly>,
    ca: Arc<CertificateAuthority>,
) -> Result<ProxyHandle, anyhow::Error> {
    let config = hoverfly.config();
    let addr: SocketAddr = format!("{}:{}", config.bind_host(), config.proxy_port)
        .parse()
        .context("Invalid proxy listen address")?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind proxy port {}", config.proxy_port))?;

    info!(
        port = config.proxy_port,
        webserver = config.webserver,
        destination = %hoverfly.destination(),
        mode = %hoverfly.mode().name(),
        "proxy serving"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(accept_loop(listener, hoverfly, ca, shutdown_rx));

    Ok(ProxyHandle {
        shutdown: shutdown_tx,
        task,
    })
}

async fn accept_loop(
    listener: TcpListener,
    hoverfly: Arc<Hoverfly>,
    ca: Arc<CertificateAuthority>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("proxy listener stopping");
                break;
            }
            accepted = listener.accept() => {
                let (stream, remote_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let hoverfly = Arc::clone(&hoverfly);
                let ca = Arc::clone(&ca);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req| {
                        let hoverfly = Arc::clone(&hoverfly);
                        let ca = Arc::clone(&ca);
                        async move { Ok::<_, Infallible>(route(hoverfly, ca, req).await) }
                    });

                    if let Err(e) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        debug!(remote = %remote_addr, error = %e, "connection error");
                    }
                });
            }
        }
    }
}

async fn route(
    hoverfly: Arc<Hoverfly>,
    ca: Arc<CertificateAuthority>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    if req.method() == Method::CONNECT {
        if hoverfly.config().webserver {
            return Response::builder()
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .body(Full::new(Bytes::from_static(
                    b"CONNECT is not supported in webserver mode",
                )))
                .expect("static response is valid");
        }
        return handle_connect(hoverfly, ca, req);
    }

    handle_request(hoverfly, req, "http", None).await
}

/// Answer CONNECT, then intercept the tunnel: TLS-handshake the client with
/// a minted leaf and serve the decrypted requests through the pipeline.
fn handle_connect(
    hoverfly: Arc<Hoverfly>,
    ca: Arc<CertificateAuthority>,
    req: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let authority = match req.uri().authority() {
        Some(authority) => authority.to_string(),
        None => {
            return Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(Full::new(Bytes::from_static(b"CONNECT target missing")))
                .expect("static response is valid");
        }
    };
    let host = authority
        .split(':')
        .next()
        .unwrap_or(&authority)
        .to_string();

    tokio::spawn(async move {
        let upgraded = match hyper::upgrade::on(req).await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                debug!(error = %e, "CONNECT upgrade failed");
                return;
            }
        };

        let acceptor = match ca.acceptor_for(&host) {
            Ok(acceptor) => acceptor,
            Err(e) => {
                error!(host, error = %e, "could not mint leaf certificate");
                return;
            }
        };

        let tls_stream = match acceptor.accept(TokioIo::new(upgraded)).await {
            Ok(tls_stream) => tls_stream,
            Err(e) => {
                debug!(host, error = %e, "TLS handshake failed");
                return;
            }
        };

        let io = TokioIo::new(tls_stream);
        let service = service_fn(move |req| {
            let hoverfly = Arc::clone(&hoverfly);
            let authority = authority.clone();
            async move {
                Ok::<_, Infallible>(handle_request(hoverfly, req, "https", Some(authority)).await)
            }
        });

        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
            debug!(host, error = %e, "tunnel connection error");
        }
    });

    // The TLS handshake happens on the upgraded socket after this goes out.
    Response::new(Full::new(Bytes::new()))
}
