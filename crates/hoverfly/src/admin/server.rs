//! Admin API server.

use super::router::route_request;
use crate::engine::Hoverfly;
use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

pub struct AdminServer {
    addr: SocketAddr,
    hoverfly: Arc<Hoverfly>,
}

impl AdminServer {
    pub fn new(hoverfly: Arc<Hoverfly>) -> Result<AdminServer, anyhow::Error> {
        let config = hoverfly.config();
        let addr: SocketAddr = format!("{}:{}", config.bind_host(), config.admin_port)
            .parse()
            .context("Invalid admin listen address")?;
        Ok(AdminServer { addr, hoverfly })
    }

    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind admin port {}", self.addr.port()))?;
        info!(port = self.addr.port(), "admin API serving");

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let hoverfly = Arc::clone(&self.hoverfly);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let hoverfly = Arc::clone(&hoverfly);
                    async move { route_request(req, hoverfly).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(error = %e, "admin connection error");
                }
            });
        }
    }
}
