// Library exports shared by the binary and the integration tests.

pub mod admin;
pub mod cache;
pub mod config;
pub mod engine;
pub mod logs;
pub mod matching;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod modes;
pub mod proxy;
pub mod templating;
