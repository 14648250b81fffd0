//! Bundle Relay Submitter Library
//!
//! Builds memo-carrying payload transactions plus a tip transfer against a
//! single recency anchor, assembles them into a capacity-bounded bundle and
//! submits it to a block-engine relay, then follows the bundle's result on
//! a long-lived subscription.

pub mod config;
pub mod endpoints;
pub mod ledger;
pub mod metrics;
pub mod observability;
pub mod orchestrator;
pub mod relay;
pub mod structured_logging;
pub mod test_utils;
pub mod tx_builder;
pub mod wallet;

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
