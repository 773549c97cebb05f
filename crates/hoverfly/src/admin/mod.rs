//! The admin REST API: mode, destination, middleware, simulation store,
//! cache, logs and diff management.

mod handlers;
mod router;
mod server;
pub mod types;

pub use router::route_request;
pub use server::AdminServer;
