//! Bundle assembly
//!
//! A bundle is an ordered group of signed transactions the relay executes
//! all-or-nothing, in the order given. Assembly only enforces the size
//! limit; signatures and recency anchors are the builders' concern.

use crate::tx_builder::errors::{BundleError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use solana_sdk::transaction::VersionedTransaction;
use std::fmt;
use std::str::FromStr;

/// Relay-imposed default limit on transactions per bundle
pub const DEFAULT_BUNDLE_CAPACITY: usize = 5;

/// Ordered, size-bounded group of signed transactions
///
/// Deserialization goes through [`assemble_bundle`], so a decoded bundle
/// holds the same capacity invariant as a freshly assembled one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BundleParts")]
pub struct Bundle {
    transactions: Vec<VersionedTransaction>,
    capacity: usize,
}

/// Unchecked serialized form of a [`Bundle`]
#[derive(Deserialize)]
struct BundleParts {
    transactions: Vec<VersionedTransaction>,
    capacity: usize,
}

impl TryFrom<BundleParts> for Bundle {
    type Error = BundleError;

    fn try_from(parts: BundleParts) -> Result<Self> {
        assemble_bundle(parts.transactions, parts.capacity)
    }
}

impl Bundle {
    /// Transactions in execution order
    pub fn transactions(&self) -> &[VersionedTransaction] {
        &self.transactions
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Base-58 first signature of every transaction, in bundle order
    pub fn signatures(&self) -> Vec<String> {
        self.transactions
            .iter()
            .map(crate::tx_builder::first_signature_b58)
            .collect()
    }

    /// Wire form expected by `sendBundle`: base64 of each bincode-encoded transaction
    pub fn encode_base64(&self) -> Result<Vec<String>> {
        self.transactions
            .iter()
            .map(|tx| {
                bincode::serialize(tx)
                    .map(|bytes| STANDARD.encode(bytes))
                    .map_err(|e| BundleError::Serialization(e.to_string()))
            })
            .collect()
    }
}

/// Group `transactions` into a bundle, preserving their order
///
/// # Errors
///
/// - [`BundleError::Configuration`] if `capacity` is zero
/// - [`BundleError::CapacityExceeded`] if there are more transactions than
///   `capacity`; no bundle is produced
pub fn assemble_bundle(transactions: Vec<VersionedTransaction>, capacity: usize) -> Result<Bundle> {
    if capacity == 0 {
        return Err(BundleError::config("bundle capacity must be positive"));
    }
    if transactions.len() > capacity {
        return Err(BundleError::CapacityExceeded {
            len: transactions.len(),
            capacity,
        });
    }
    Ok(Bundle {
        transactions,
        capacity,
    })
}

/// Where the tip transfer goes within a bundle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TipPlacement {
    /// Standalone tip transaction ahead of the payloads
    First,
    /// Standalone tip transaction after the payloads
    #[default]
    Last,
    /// Tip instruction appended to the final payload transaction
    Embedded,
}

impl TipPlacement {
    /// Whether a standalone tip transaction has to be built
    pub fn needs_tip_transaction(self) -> bool {
        !matches!(self, Self::Embedded)
    }

    /// Order payload and tip transactions according to this placement
    ///
    /// With [`TipPlacement::Embedded`] the tip already lives inside the
    /// payloads and `tip` is expected to be `None`.
    pub fn arrange(
        self,
        payloads: Vec<VersionedTransaction>,
        tip: Option<VersionedTransaction>,
    ) -> Vec<VersionedTransaction> {
        let mut ordered = Vec::with_capacity(payloads.len() + 1);
        match self {
            Self::First => {
                ordered.extend(tip);
                ordered.extend(payloads);
            }
            Self::Last | Self::Embedded => {
                ordered.extend(payloads);
                ordered.extend(tip);
            }
        }
        ordered
    }
}

impl fmt::Display for TipPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::First => "first",
            Self::Last => "last",
            Self::Embedded => "embedded",
        };
        f.write_str(s)
    }
}

impl FromStr for TipPlacement {
    type Err = BundleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "embedded" => Ok(Self::Embedded),
            other => Err(BundleError::config(format!(
                "unknown tip placement '{}', expected first|last|embedded",
                other
            ))),
        }
    }
}
