//! Error types for bundle construction and submission
//!
//! Every failure a submission cycle can hit is expressed as one
//! [`BundleError`] variant. Errors carry enough context to be logged as
//! structured fields and are never retried automatically: each variant
//! either aborts the current cycle or, for the fatal ones, the process.

use std::time::Duration;
use thiserror::Error;

/// Comprehensive error type for the bundle submission lifecycle
///
/// This covers:
/// - Startup (configuration, credentials)
/// - Cycle preparation (recency anchor, tip account discovery)
/// - Transaction building and signing
/// - Bundle assembly
/// - Relay submission and the result stream
#[derive(Error, Debug)]
pub enum BundleError {
    /// Missing or invalid endpoint, credential path or tuning knob
    ///
    /// Fatal at startup: no submission is attempted.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The relay returned no tip accounts to pay
    #[error("Relay returned an empty tip account set")]
    EmptyCandidateSet,

    /// More transactions than the bundle can hold
    ///
    /// A programming or configuration error; raised at assembly time so
    /// that an oversized bundle never reaches the relay.
    #[error("Bundle capacity exceeded: {len} transactions, capacity {capacity}")]
    CapacityExceeded {
        /// Number of transactions offered
        len: usize,
        /// Configured capacity
        capacity: usize,
    },

    /// The relay synchronously refused the bundle
    #[error("Bundle rejected by relay: {0}")]
    SubmissionRejected(String),

    /// The asynchronous result stream failed
    ///
    /// Unrecoverable: delivered on the result channel and terminates the
    /// process.
    #[error("Bundle result stream fault: {0}")]
    StreamFault(String),

    /// The tip amount must be strictly positive
    #[error("Invalid tip amount: {0} lamports")]
    InvalidTipAmount(u64),

    /// Failed to sign a transaction
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Failed to compile instructions into a message
    #[error("Message compilation failed: {0}")]
    MessageCompile(String),

    /// Failed to fetch a recency anchor (recent blockhash) from the ledger
    #[error("Recency anchor error: {0}")]
    Anchor(String),

    /// The ledger refused or failed to broadcast a raw transaction
    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    /// Relay transport failure that is not an explicit rejection
    #[error("Relay error: {0}")]
    Relay(String),

    /// An external call exceeded its configured deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that timed out
        operation: &'static str,
        /// The configured deadline
        after: Duration,
    },

    /// Failed to encode or decode a wire payload
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Wrapped error from external crates
    #[error("External error: {0}")]
    External(#[from] anyhow::Error),
}

impl BundleError {
    /// Whether this error must terminate the process rather than just the cycle
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::StreamFault(_))
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "config",
            Self::EmptyCandidateSet => "empty_candidates",
            Self::CapacityExceeded { .. } => "capacity",
            Self::SubmissionRejected(_) => "rejected",
            Self::StreamFault(_) => "stream",
            Self::InvalidTipAmount(_) => "tip",
            Self::Signing(_) => "signing",
            Self::MessageCompile(_) => "compile",
            Self::Anchor(_) => "anchor",
            Self::Broadcast(_) => "broadcast",
            Self::Relay(_) => "relay",
            Self::Timeout { .. } => "timeout",
            Self::Serialization(_) => "serialization",
            Self::External(_) => "external",
        }
    }
}

// Convenience constructors for common error scenarios
impl BundleError {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Create a relay rejection error
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::SubmissionRejected(reason.into())
    }

    /// Create a result stream fault
    pub fn stream_fault(reason: impl Into<String>) -> Self {
        Self::StreamFault(reason.into())
    }

    /// Create a relay transport error
    pub fn relay(reason: impl Into<String>) -> Self {
        Self::Relay(reason.into())
    }
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, BundleError>;
