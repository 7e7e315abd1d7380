/// Error types for the pub/sub server.
///
/// This module provides a comprehensive error hierarchy that covers all failure
/// modes described in the design: parse errors, I/O errors, lifecycle
/// failures and configuration errors. All fallible operations return
/// `Result<T, PubsubError>`.
use thiserror::Error;

/// The main error type for pub/sub server operations.
///
/// All fallible operations return `Result<T, PubsubError>`. This provides a
/// unified error handling interface across the entire crate.
#[derive(Error, Debug)]
pub enum PubsubError {
    /// A JSON document could not be parsed, or `flush` was called while the
    /// parser was mid-construct.
    #[error("json parse error: {0}")]
    JsonParseError(String),

    /// An HTTP request could not be parsed into a header object.
    #[error("http parse error: {0}")]
    HttpParseError(String),

    /// A read, write or timer operation failed at the transport level.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// `remove_configuration` was called for a group with no matching entry.
    #[error("no such configuration: {0}")]
    NoSuchConfiguration(String),

    /// `update_node` was called for a name with no subscribed node in the
    /// store.
    #[error("no such node: {0}")]
    NoSuchNode(String),

    /// The on-disk server configuration file could not be parsed.
    #[error("invalid config file: {0}")]
    ConfigFileError(String),

    /// A subscription never reached the store: invalid node, unauthorized,
    /// or initialization failed. Carries the stage at which it stopped so
    /// callers can distinguish the three lifecycle failures.
    #[error("subscription failed at {stage}: {node}")]
    SubscriptionFailed {
        /// Which lifecycle stage rejected the subscription.
        stage: &'static str,
        /// The node name the subscription targeted, rendered for display.
        node: String,
    },

    /// A delta operation referenced a path that does not exist in the value
    /// it was applied to. Only possible if history and data have drifted
    /// apart, which the node store's own invariants should prevent.
    #[error("delta apply error: {0}")]
    DeltaApplyError(String),
}

/// Result type alias for pub/sub server operations.
pub type PubsubResult<T> = Result<T, PubsubError>;
