//! Test Utilities Module
//!
//! In-memory stand-ins for the ledger and the relay so the whole
//! submission cycle can run without a network. All behavior is
//! deterministic and switchable at runtime.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use crate::ledger::LedgerClient;
use crate::relay::{BundleId, BundleOutcome, BundleStatus, RelayClient};
use crate::tx_builder::{assemble_bundle, build_payload_transaction, Bundle, BundleError, Result};
use async_trait::async_trait;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
};
use std::io::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Build a bundle of `count` signed note transactions
pub fn sample_bundle(count: usize) -> Bundle {
    let signer = Keypair::new();
    let anchor = Hash::new_unique();
    let txs = (0..count)
        .map(|i| {
            build_payload_transaction(&signer, format!("sample {}", i).as_bytes(), anchor, None)
                .expect("sample transaction")
        })
        .collect();
    assemble_bundle(txs, count.max(1)).expect("sample bundle")
}

/// Write `keypair` as a JSON byte array into a temp file
pub fn write_keypair_file(keypair: &Keypair) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    let json = serde_json::to_string(&keypair.to_bytes().to_vec()).expect("json");
    file.write_all(json.as_bytes()).expect("write keypair");
    file
}

/// Mock ledger returning a fixed recency anchor
pub struct MockLedger {
    anchor: Hash,
    anchor_calls: AtomicUsize,
    failure: Mutex<Option<String>>,
    delay: Mutex<Option<Duration>>,
    broadcasts: Mutex<Vec<Vec<u8>>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            anchor: Hash::new_unique(),
            anchor_calls: AtomicUsize::new(0),
            failure: Mutex::new(None),
            delay: Mutex::new(None),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    /// The anchor every call returns
    pub fn anchor(&self) -> Hash {
        self.anchor
    }

    /// Number of anchor fetches so far
    pub fn anchor_calls(&self) -> usize {
        self.anchor_calls.load(Ordering::SeqCst)
    }

    /// Make anchor fetches fail with `reason`
    pub async fn fail_anchor(&self, reason: &str) {
        *self.failure.lock().await = Some(reason.to_string());
    }

    /// Delay every anchor fetch by `delay`
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.lock().await = Some(delay);
    }

    /// Raw transactions broadcast so far
    pub async fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.broadcasts.lock().await.clone()
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_recent_anchor(&self) -> Result<Hash> {
        self.anchor_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failure.lock().await.as_ref() {
            Some(reason) => Err(BundleError::Anchor(reason.clone())),
            None => Ok(self.anchor),
        }
    }

    async fn broadcast_raw(&self, tx_bytes: &[u8]) -> Result<Signature> {
        self.broadcasts.lock().await.push(tx_bytes.to_vec());
        Ok(Signature::from([7u8; 64]))
    }
}

struct RelayBehavior {
    rejection: Option<String>,
    outcome: BundleOutcome,
    landed_slot: Option<u64>,
    poll_failure: Option<String>,
}

/// Mock relay with scripted tip accounts, submission and status behavior
///
/// Submissions are accepted and reported as [`BundleOutcome::Accepted`]
/// unless configured otherwise.
pub struct MockRelay {
    tip_accounts: Vec<Pubkey>,
    tip_account_calls: AtomicUsize,
    status_poll_calls: AtomicUsize,
    largest_status_batch: AtomicUsize,
    tip_account_delay: Mutex<Option<Duration>>,
    next_id: AtomicU64,
    behavior: Mutex<RelayBehavior>,
    submitted: Mutex<Vec<(BundleId, Bundle)>>,
}

impl MockRelay {
    pub fn new(tip_accounts: Vec<Pubkey>) -> Self {
        Self {
            tip_accounts,
            tip_account_calls: AtomicUsize::new(0),
            status_poll_calls: AtomicUsize::new(0),
            largest_status_batch: AtomicUsize::new(0),
            tip_account_delay: Mutex::new(None),
            next_id: AtomicU64::new(1),
            behavior: Mutex::new(RelayBehavior {
                rejection: None,
                outcome: BundleOutcome::Accepted,
                landed_slot: None,
                poll_failure: None,
            }),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Relay publishing `count` fresh tip accounts
    pub fn with_tip_accounts(count: usize) -> Self {
        Self::new((0..count).map(|_| Pubkey::new_unique()).collect())
    }

    pub fn tip_accounts(&self) -> &[Pubkey] {
        &self.tip_accounts
    }

    pub fn tip_account_calls(&self) -> usize {
        self.tip_account_calls.load(Ordering::SeqCst)
    }

    /// Delay every tip account request by `delay`
    pub async fn set_tip_account_delay(&self, delay: Duration) {
        *self.tip_account_delay.lock().await = Some(delay);
    }

    /// Number of status requests so far
    pub fn status_poll_calls(&self) -> usize {
        self.status_poll_calls.load(Ordering::SeqCst)
    }

    /// Most ids seen in a single status request
    pub fn largest_status_batch(&self) -> usize {
        self.largest_status_batch.load(Ordering::SeqCst)
    }

    pub async fn submitted_count(&self) -> usize {
        self.submitted.lock().await.len()
    }

    pub async fn submitted_bundles(&self) -> Vec<Bundle> {
        self.submitted
            .lock()
            .await
            .iter()
            .map(|(_, bundle)| bundle.clone())
            .collect()
    }

    /// Outcome reported for every submitted bundle from now on
    pub async fn set_outcome(&self, outcome: BundleOutcome) {
        let mut behavior = self.behavior.lock().await;
        behavior.outcome = outcome;
        behavior.landed_slot = (outcome == BundleOutcome::Landed).then_some(1_000);
    }

    pub async fn reject_submissions(&self, reason: &str) {
        self.behavior.lock().await.rejection = Some(reason.to_string());
    }

    pub async fn accept_submissions(&self) {
        self.behavior.lock().await.rejection = None;
    }

    pub async fn fail_status_polls(&self, reason: &str) {
        self.behavior.lock().await.poll_failure = Some(reason.to_string());
    }
}

#[async_trait]
impl RelayClient for MockRelay {
    async fn get_tip_accounts(&self) -> Result<Vec<Pubkey>> {
        self.tip_account_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.tip_account_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.tip_accounts.clone())
    }

    async fn send_bundle(&self, bundle: &Bundle) -> Result<BundleId> {
        if let Some(reason) = self.behavior.lock().await.rejection.as_ref() {
            return Err(BundleError::rejected(reason.clone()));
        }
        let id = BundleId::new(format!(
            "bundle-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        self.submitted.lock().await.push((id.clone(), bundle.clone()));
        Ok(id)
    }

    async fn get_bundle_statuses(&self, ids: &[BundleId]) -> Result<Vec<BundleStatus>> {
        self.status_poll_calls.fetch_add(1, Ordering::SeqCst);
        self.largest_status_batch.fetch_max(ids.len(), Ordering::SeqCst);
        let behavior = self.behavior.lock().await;
        if let Some(reason) = behavior.poll_failure.as_ref() {
            return Err(BundleError::relay(reason.clone()));
        }
        let submitted = self.submitted.lock().await;
        Ok(ids
            .iter()
            .filter(|id| submitted.iter().any(|(known, _)| known == *id))
            .map(|id| BundleStatus {
                bundle_id: id.clone(),
                outcome: behavior.outcome,
                landed_slot: behavior.landed_slot,
                context_slot: Some(1_001),
            })
            .collect())
    }
}
