//! Process configuration assembled at startup from CLI flags.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub proxy_port: u16,
    pub admin_port: u16,
    /// Destination filter regex; `.` passes everything through the pipeline.
    pub destination: String,
    /// Optional forward proxy used for upstream requests.
    pub upstream_proxy: Option<String>,
    /// Verify upstream TLS certificates.
    pub tls_verification: bool,
    /// Disable the Simulate fingerprint cache.
    pub cache_disabled: bool,
    /// Serve as a plain HTTP origin instead of a forward/MITM proxy.
    pub webserver: bool,
    /// Emit CORS headers on admin responses.
    pub cors: bool,
    /// Bind on all interfaces instead of loopback only.
    pub listen_on_all_interfaces: bool,
    /// PEM paths for the MITM CA; a throwaway CA is generated when unset.
    pub ca_cert_path: Option<String>,
    pub ca_key_path: Option<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            proxy_port: 8500,
            admin_port: 8888,
            destination: ".".to_string(),
            upstream_proxy: None,
            tls_verification: true,
            cache_disabled: false,
            webserver: false,
            cors: false,
            listen_on_all_interfaces: false,
            ca_cert_path: None,
            ca_key_path: None,
        }
    }
}

impl Configuration {
    pub fn bind_host(&self) -> &'static str {
        if self.listen_on_all_interfaces {
            "0.0.0.0"
        } else {
            "127.0.0.1"
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.proxy_port == self.admin_port {
            anyhow::bail!(
                "Proxy port and admin port must differ (both set to {})",
                self.proxy_port
            );
        }
        if self.ca_cert_path.is_some() != self.ca_key_path.is_some() {
            anyhow::bail!("CA certificate and key paths must be provided together");
        }
        regex::Regex::new(&self.destination)
            .map_err(|e| anyhow::anyhow!("Invalid destination filter regex: {e}"))?;
        Ok(())
    }
}
