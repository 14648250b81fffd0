//! Block-engine relay integration
//!
//! The relay accepts bundles out-of-band from normal ledger submission,
//! publishes the accounts it accepts tips on, and reports what became of
//! each bundle. This module provides:
//! - **RelayClient**: the collaborator trait (tip accounts, send, status)
//! - **jsonrpc**: the HTTP JSON-RPC implementation
//! - **subscription**: the submission client and its typed result channel

use crate::tx_builder::{Bundle, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;

pub mod jsonrpc;
pub mod subscription;

pub use jsonrpc::JsonRpcRelayClient;
pub use subscription::{ResultSubscription, SubmissionClient, SubscriptionConfig};

/// Relay-assigned bundle identifier, the correlation token for results
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleId(String);

impl BundleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Confirmation that the relay took the bundle into consideration
///
/// Says nothing about whether any transaction landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleAck {
    pub bundle_id: BundleId,
    pub submitted_at: DateTime<Utc>,
}

/// What the relay reports about a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleOutcome {
    /// Accepted and pending inclusion
    Accepted,
    /// Included in a block
    Landed,
    /// Failed simulation or auction
    Rejected,
    /// Unknown to the relay or expired
    Dropped,
}

impl BundleOutcome {
    /// Final outcomes; a bundle is no longer tracked after reaching one
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Accepted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Landed => "landed",
            Self::Rejected => "rejected",
            Self::Dropped => "dropped",
        }
    }
}

impl fmt::Display for BundleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status row as returned by the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleStatus {
    pub bundle_id: BundleId,
    pub outcome: BundleOutcome,
    pub landed_slot: Option<u64>,
    /// Slot at which the relay evaluated the status
    pub context_slot: Option<u64>,
}

/// Asynchronous outcome notification delivered on the result channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleResult {
    pub bundle_id: BundleId,
    pub outcome: BundleOutcome,
    pub landed_slot: Option<u64>,
    pub context_slot: Option<u64>,
    pub received_at: DateTime<Utc>,
}

impl From<BundleStatus> for BundleResult {
    fn from(status: BundleStatus) -> Self {
        Self {
            bundle_id: status.bundle_id,
            outcome: status.outcome,
            landed_slot: status.landed_slot,
            context_slot: status.context_slot,
            received_at: Utc::now(),
        }
    }
}

/// Item carried by the result channel
#[derive(Debug)]
pub enum BundleEvent {
    Result(BundleResult),
    /// The stream failed; always [`crate::tx_builder::BundleError::StreamFault`].
    /// No further events follow.
    Fault(crate::tx_builder::BundleError),
}

/// Relay collaborator
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Accounts the relay currently accepts tips on
    async fn get_tip_accounts(&self) -> Result<Vec<Pubkey>>;

    /// Submit a bundle
    ///
    /// A refusal by the relay is [`crate::tx_builder::BundleError::SubmissionRejected`];
    /// transport failures are [`crate::tx_builder::BundleError::Relay`].
    async fn send_bundle(&self, bundle: &Bundle) -> Result<BundleId>;

    /// Current status of each listed bundle
    async fn get_bundle_statuses(&self, ids: &[BundleId]) -> Result<Vec<BundleStatus>>;
}
