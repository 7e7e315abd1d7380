//! # pubsubd
//!
//! An HTTP-fronted publish/subscribe server: a node store with versioned
//! updates and compact deltas, wired into an asynchronous per-connection
//! HTTP server that validates, authorizes, initializes, and serves
//! long-lived subscriptions.
//!
//! ## Architecture
//!
//! - [`json`] — immutable JSON values and a chunk-resumable streaming
//!   parser.
//! - [`delta`] — minimal edit scripts between two JSON values.
//! - [`node`], [`version`], [`config`] — the node store: a versioned
//!   document with bounded history, and the configuration that governs
//!   it.
//! - [`pubsub`] — the subscription root: validate → authorize →
//!   initialize → deliver, driven by an embedder-supplied adapter.
//! - [`io_plan`] — deterministic simulated sockets and epoch-tagged
//!   timers, used to drive [`connection`] from tests.
//! - [`request`], [`response`], [`connection`] — the HTTP side: a minimal
//!   pipelined request parser, response objects with their own write
//!   lifecycle, and the per-connection state machine tying them together.
//! - [`subscription_response`] — the one response type that talks back to
//!   the node store, turning `on_update` into written frames.

pub mod config;
pub mod config_file;
pub mod connection;
pub mod delta;
pub mod error;
pub mod io_plan;
pub mod json;
pub mod node;
pub mod pubsub;
pub mod request;
pub mod response;
pub mod subscription_response;
pub mod version;

pub use error::{PubsubError, PubsubResult};

/// Initialize the logging system. Controlled via the `PUBSUBD_LOG`
/// environment variable (default `info`).
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("PUBSUBD_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Initialize logging with a specific level, bypassing the environment
/// variable. Used by tests that need deterministic output.
pub fn init_logging_with_level(level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(level);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
