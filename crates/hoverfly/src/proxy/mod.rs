//! The proxy/MITM listener.

mod handler;
mod mitm;
mod server;

pub use handler::handle_request;
pub use mitm::CertificateAuthority;
pub use server::{start_proxy, ProxyHandle};
