//! Newsletter subscription endpoint.
//!
//! Validates an email, rate limits per client IP and idempotently upserts the
//! subscriber into the configured store. See `web::routes` for the HTTP surface.

pub mod app;
pub mod config;
mod error;
pub mod model;
pub mod web;

// re-exports
pub use app::{serve, App, AppState};
pub use error::{Error, Result};

use tracing_subscriber::EnvFilter;

/// Human readable output for local development. `RUST_LOG` overrides the `debug` default.
pub fn init_dbg_tracing() {
    tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_env_filter(env_filter("debug"))
        .compact()
        .init();
}

/// One JSON object per event. `RUST_LOG` overrides the `info` default.
pub fn init_production_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .init();
}

fn env_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}
