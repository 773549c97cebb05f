use clap::Parser;
use hoverfly::admin::AdminServer;
use hoverfly::config::Configuration;
use hoverfly::engine::Hoverfly;
use hoverfly::logs::{BufferLayer, LOG_BUFFER};
use hoverfly::middleware::Middleware;
use hoverfly::models::SimulationView;
use hoverfly::modes::{Mode, ModeArgumentsView};
use hoverfly::proxy::{start_proxy, CertificateAuthority};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "hoverfly", about = "Service-virtualization proxy")]
struct Args {
    /// Proxy port
    #[arg(long = "pp", default_value_t = 8500)]
    proxy_port: u16,
    /// Admin API port
    #[arg(long = "ap", default_value_t = 8888)]
    admin_port: u16,
    /// Destination filter regex
    #[arg(long, default_value = ".")]
    destination: String,
    /// Starting mode
    #[arg(long, default_value = "simulate")]
    mode: String,
    /// Local middleware command ("binary" or "binary script")
    #[arg(long)]
    middleware: Option<String>,
    /// Run as an HTTP origin server instead of a proxy
    #[arg(long)]
    webserver: bool,
    /// Disable the Simulate response cache
    #[arg(long = "disable-cache")]
    disable_cache: bool,
    /// Skip upstream TLS certificate verification
    #[arg(long = "skip-tls-verification")]
    skip_tls_verification: bool,
    /// Forward upstream requests through this proxy
    #[arg(long = "upstream-proxy")]
    upstream_proxy: Option<String>,
    /// Bind on all interfaces instead of loopback
    #[arg(long = "listen-on-all-interfaces")]
    listen_on_all_interfaces: bool,
    /// Emit CORS headers on admin responses
    #[arg(long)]
    cors: bool,
    /// PEM certificate for the MITM CA (requires --key)
    #[arg(long)]
    cert: Option<String>,
    /// PEM private key for the MITM CA (requires --cert)
    #[arg(long)]
    key: Option<String>,
    /// Simulation files to import at startup
    #[arg(long = "import")]
    import: Vec<String>,
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(tracing_subscriber::fmt::layer())
        .with(BufferLayer::new(LOG_BUFFER.clone()))
        .init();

    let config = Configuration {
        proxy_port: args.proxy_port,
        admin_port: args.admin_port,
        destination: args.destination,
        upstream_proxy: args.upstream_proxy,
        tls_verification: !args.skip_tls_verification,
        cache_disabled: args.disable_cache,
        webserver: args.webserver,
        cors: args.cors,
        listen_on_all_interfaces: args.listen_on_all_interfaces,
        ca_cert_path: args.cert,
        ca_key_path: args.key,
    };

    let hoverfly = Arc::new(Hoverfly::new(config)?);

    let mode = Mode::from_name(&args.mode, ModeArgumentsView::default())
        .map_err(|e| anyhow::anyhow!(e.message))?;
    hoverfly
        .set_mode(mode)
        .map_err(|e| anyhow::anyhow!(e.message))?;

    if let Some(command) = args.middleware {
        hoverfly.set_middleware(Some(Middleware::Local {
            binary: command,
            script_path: None,
        }));
    }

    for file in &args.import {
        let raw = std::fs::read_to_string(file)
            .map_err(|e| anyhow::anyhow!("Could not read simulation '{file}': {e}"))?;
        let view = SimulationView::parse(&raw)
            .map_err(|e| anyhow::anyhow!("Could not import simulation '{file}': {e}"))?;
        hoverfly
            .import(view)
            .map_err(|e| anyhow::anyhow!("Could not import simulation '{file}': {e}"))?;
        info!(file = %file, "imported simulation");
    }

    let ca = match (
        &hoverfly.config().ca_cert_path,
        &hoverfly.config().ca_key_path,
    ) {
        (Some(cert), Some(key)) => CertificateAuthority::from_pem_files(cert, key)?,
        _ => CertificateAuthority::generate()?,
    };

    let proxy = start_proxy(Arc::clone(&hoverfly), Arc::new(ca)).await?;

    let admin = AdminServer::new(Arc::clone(&hoverfly))?;
    tokio::spawn(async move {
        if let Err(e) = admin.run().await {
            error!(error = %e, "admin API stopped");
        }
    });

    tokio::signal::ctrl_c().await.ok();
    info!("shutting down");
    proxy.stop().await;

    Ok(())
}
