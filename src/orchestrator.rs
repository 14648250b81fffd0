//! Submission cycle orchestration
//!
//! One cycle walks a strictly forward state machine:
//!
//! ```text
//! Idle -> AnchorAcquired -> DestinationSelected -> TransactionsBuilt
//!      -> BundleAssembled -> Submitted -> ResultObserved
//!                         \-> SubmissionFailed
//! ```
//!
//! Every transition is a single attempt. Failures before submission abort
//! the cycle with an error; a failed submission ends in the terminal
//! `SubmissionFailed` state. The recency anchor is fetched exactly once per
//! cycle and shared by every transaction of the bundle.

use crate::config::BundleConfig;
use crate::ledger::LedgerClient;
use crate::metrics::{metrics, Timer};
use crate::observability::CorrelationId;
use crate::relay::{BundleAck, BundleEvent, BundleResult, ResultSubscription, SubmissionClient};
use crate::structured_logging::CycleLogger;
use crate::tx_builder::{
    assemble_bundle, build_incentive_transaction, build_payload_transaction, first_signature_b58,
    select_tip_account, tip_instruction, Bundle, BundleError, Result, TipPlacement, TIP_LAMPORTS,
};
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::VersionedTransaction,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// What a cycle builds
#[derive(Debug, Clone)]
pub struct CyclePlan {
    /// One payload transaction per note, in order
    pub notes: Vec<Vec<u8>>,
    pub capacity: usize,
    pub tip_placement: TipPlacement,
    pub tip_lamports: u64,
}

impl CyclePlan {
    pub fn from_config(config: &BundleConfig) -> Self {
        Self {
            notes: config.notes.iter().map(|n| n.as_bytes().to_vec()).collect(),
            capacity: config.capacity,
            tip_placement: config.tip_placement,
            tip_lamports: TIP_LAMPORTS,
        }
    }
}

/// Deadlines for the cycle's external calls; `None` waits indefinitely
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleTimeouts {
    /// Recency anchor fetch
    pub anchor: Option<Duration>,
    /// Tip account discovery
    pub discovery: Option<Duration>,
    /// `sendBundle` call
    pub submit: Option<Duration>,
}

/// Submission cycle state
#[derive(Debug)]
pub enum CycleState {
    Idle,
    AnchorAcquired {
        anchor: Hash,
    },
    DestinationSelected {
        anchor: Hash,
        tip_account: Pubkey,
    },
    TransactionsBuilt {
        transactions: Vec<VersionedTransaction>,
    },
    BundleAssembled {
        bundle: Bundle,
    },
    Submitted {
        ack: BundleAck,
    },
    ResultObserved {
        ack: BundleAck,
        result: BundleResult,
    },
    SubmissionFailed {
        error: BundleError,
    },
}

impl CycleState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AnchorAcquired { .. } => "anchor_acquired",
            Self::DestinationSelected { .. } => "destination_selected",
            Self::TransactionsBuilt { .. } => "transactions_built",
            Self::BundleAssembled { .. } => "bundle_assembled",
            Self::Submitted { .. } => "submitted",
            Self::ResultObserved { .. } => "result_observed",
            Self::SubmissionFailed { .. } => "submission_failed",
        }
    }

    /// Whether the build/submit part of the cycle is over
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Submitted { .. } | Self::ResultObserved { .. } | Self::SubmissionFailed { .. }
        )
    }

    /// Acknowledgement of the submitted bundle, if the submission succeeded
    pub fn ack(&self) -> Option<&BundleAck> {
        match self {
            Self::Submitted { ack } | Self::ResultObserved { ack, .. } => Some(ack),
            _ => None,
        }
    }
}

/// A cycle that reached submission, successful or not
#[derive(Debug)]
pub struct Cycle {
    logger: CycleLogger,
    state: CycleState,
}

impl Cycle {
    pub fn state(&self) -> &CycleState {
        &self.state
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        self.logger.correlation_id()
    }

    /// Consume one event from the shared result subscription
    ///
    /// Returns the result when it correlates with this cycle's bundle,
    /// `None` for results about other bundles.
    ///
    /// # Errors
    ///
    /// The stream fault carried by a [`BundleEvent::Fault`].
    pub fn on_event(&mut self, event: BundleEvent) -> Result<Option<&BundleResult>> {
        let result = match event {
            BundleEvent::Result(result) => result,
            BundleEvent::Fault(error) => {
                metrics().stream_faults.inc();
                return Err(error);
            }
        };
        metrics()
            .bundle_results
            .with_label_values(&[result.outcome.as_str()])
            .inc();

        let Some(ack) = self.state.ack() else {
            debug!(bundle_id = %result.bundle_id, "Result for a cycle without submission");
            return Ok(None);
        };
        if ack.bundle_id != result.bundle_id {
            debug!(bundle_id = %result.bundle_id, "Uncorrelated bundle result");
            return Ok(None);
        }

        self.logger.log_result(&result);
        let ack = ack.clone();
        let from = self.state.name();
        self.state = CycleState::ResultObserved { ack, result };
        self.logger.log_transition(from, self.state.name());

        match &self.state {
            CycleState::ResultObserved { result, .. } => Ok(Some(result)),
            _ => Ok(None),
        }
    }

    /// Wait for the first result correlated with this cycle's bundle
    ///
    /// # Errors
    ///
    /// - [`BundleError::Configuration`] when nothing was submitted
    /// - [`BundleError::StreamFault`] when the stream faults or closes
    /// - [`BundleError::Timeout`] when `deadline` elapses first
    pub async fn await_result(
        &mut self,
        subscription: &mut ResultSubscription,
        deadline: Option<Duration>,
    ) -> Result<BundleResult> {
        if self.state.ack().is_none() {
            return Err(BundleError::config(format!(
                "no bundle to observe in state {}",
                self.state.name()
            )));
        }

        with_deadline("bundle result", deadline, self.next_correlated(subscription)).await
    }

    async fn next_correlated(&mut self, subscription: &mut ResultSubscription) -> Result<BundleResult> {
        loop {
            let event = subscription
                .recv()
                .await
                .ok_or_else(|| BundleError::stream_fault("result stream closed"))?;
            if let Some(result) = self.on_event(event)? {
                return Ok(result.clone());
            }
        }
    }
}

/// Drives submission cycles
pub struct Orchestrator {
    ledger: Arc<dyn LedgerClient>,
    submitter: SubmissionClient,
    plan: CyclePlan,
    timeouts: CycleTimeouts,
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        submitter: SubmissionClient,
        plan: CyclePlan,
        timeouts: CycleTimeouts,
    ) -> Self {
        Self {
            ledger,
            submitter,
            plan,
            timeouts,
        }
    }

    /// Run one cycle up to submission
    ///
    /// Returns the cycle in `Submitted` or `SubmissionFailed` state.
    ///
    /// # Errors
    ///
    /// Any failure before submission (anchor fetch, empty tip account set,
    /// build, capacity) aborts the cycle and is returned as is.
    pub async fn run_cycle(&self, signer: &Keypair) -> Result<Cycle> {
        let logger = CycleLogger::new(CorrelationId::new());
        metrics().cycles_started.inc();
        info!(
            correlation_id = %logger.correlation_id(),
            payer = %signer.pubkey(),
            notes = self.plan.notes.len(),
            tip_placement = %self.plan.tip_placement,
            "Starting submission cycle"
        );

        let mut state = CycleState::Idle;
        while !state.is_settled() {
            let from = state.name();
            match self.advance(state, signer, &logger).await {
                Ok(next) => {
                    logger.log_transition(from, next.name());
                    state = next;
                }
                Err(error) => {
                    logger.log_aborted(from, &error);
                    metrics()
                        .cycles_aborted
                        .with_label_values(&[error.category()])
                        .inc();
                    return Err(error);
                }
            }
        }

        Ok(Cycle { logger, state })
    }

    /// Perform the single transition out of `state`
    async fn advance(
        &self,
        state: CycleState,
        signer: &Keypair,
        logger: &CycleLogger,
    ) -> Result<CycleState> {
        match state {
            CycleState::Idle => {
                let timer = Timer::new();
                let anchor = with_deadline(
                    "recency anchor fetch",
                    self.timeouts.anchor,
                    self.ledger.get_recent_anchor(),
                )
                .await?;
                timer.observe_duration(&metrics().anchor_latency);
                Ok(CycleState::AnchorAcquired { anchor })
            }
            CycleState::AnchorAcquired { anchor } => {
                let candidates = with_deadline(
                    "tip account discovery",
                    self.timeouts.discovery,
                    self.submitter.tip_accounts(),
                )
                .await?;
                let tip_account = select_tip_account(&candidates)?;
                logger.log_tip_account(&tip_account.to_string(), candidates.len());
                Ok(CycleState::DestinationSelected {
                    anchor,
                    tip_account,
                })
            }
            CycleState::DestinationSelected {
                anchor,
                tip_account,
            } => {
                let transactions = self.build_transactions(signer, anchor, &tip_account)?;
                Ok(CycleState::TransactionsBuilt { transactions })
            }
            CycleState::TransactionsBuilt { transactions } => {
                let bundle = assemble_bundle(transactions, self.plan.capacity)?;
                logger.log_bundle_assembled(&bundle.signatures(), bundle.capacity());
                Ok(CycleState::BundleAssembled { bundle })
            }
            CycleState::BundleAssembled { bundle } => {
                let timer = Timer::new();
                let submitted = with_deadline(
                    "bundle submission",
                    self.timeouts.submit,
                    self.submitter.submit(&bundle),
                )
                .await;
                timer.observe_duration(&metrics().submit_latency);

                match submitted {
                    Ok(ack) => {
                        metrics().bundles_submitted.inc();
                        logger.log_submitted(&ack, timer.elapsed_ms());
                        Ok(CycleState::Submitted { ack })
                    }
                    Err(error) => {
                        metrics().bundles_rejected.inc();
                        logger.log_submission_failed(&error);
                        Ok(CycleState::SubmissionFailed { error })
                    }
                }
            }
            settled @ (CycleState::Submitted { .. }
            | CycleState::ResultObserved { .. }
            | CycleState::SubmissionFailed { .. }) => Ok(settled),
        }
    }

    /// Build payload and tip transactions against `anchor`, in bundle order
    fn build_transactions(
        &self,
        signer: &Keypair,
        anchor: Hash,
        tip_account: &Pubkey,
    ) -> Result<Vec<VersionedTransaction>> {
        let placement = self.plan.tip_placement;
        if placement == TipPlacement::Embedded && self.plan.notes.is_empty() {
            return Err(BundleError::config(
                "embedded tip placement needs at least one payload note",
            ));
        }

        let last = self.plan.notes.len().saturating_sub(1);
        let mut payloads = Vec::with_capacity(self.plan.notes.len());
        for (i, note) in self.plan.notes.iter().enumerate() {
            let extra = if placement == TipPlacement::Embedded && i == last {
                Some(tip_instruction(
                    &signer.pubkey(),
                    tip_account,
                    self.plan.tip_lamports,
                )?)
            } else {
                None
            };
            payloads.push(build_payload_transaction(signer, note, anchor, extra)?);
        }

        let tip = if placement.needs_tip_transaction() {
            Some(build_incentive_transaction(
                signer,
                tip_account,
                self.plan.tip_lamports,
                anchor,
            )?)
        } else {
            None
        };

        Ok(placement.arrange(payloads, tip))
    }

    /// Send a single note transaction directly through the ledger, outside any bundle
    pub async fn broadcast_note(&self, signer: &Keypair, note: &[u8]) -> Result<Signature> {
        let anchor = with_deadline(
            "recency anchor fetch",
            self.timeouts.anchor,
            self.ledger.get_recent_anchor(),
        )
        .await?;
        let tx = build_payload_transaction(signer, note, anchor, None)?;
        let bytes =
            bincode::serialize(&tx).map_err(|e| BundleError::Serialization(e.to_string()))?;

        let signature = self.ledger.broadcast_raw(&bytes).await?;
        info!(
            signature = %signature,
            local_signature = %first_signature_b58(&tx),
            "Broadcast note transaction"
        );
        Ok(signature)
    }
}

/// Await `fut`, bounded by `deadline` when one is configured
async fn with_deadline<T, F>(operation: &'static str, deadline: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| BundleError::Timeout { operation, after })?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::{BundleId, BundleOutcome, SubscriptionConfig};
    use crate::test_utils::{MockLedger, MockRelay};
    use crate::tx_builder::MEMO_PROGRAM_ID;
    use solana_sdk::system_program;

    fn plan(notes: &[&str], placement: TipPlacement) -> CyclePlan {
        CyclePlan {
            notes: notes.iter().map(|n| n.as_bytes().to_vec()).collect(),
            capacity: 5,
            tip_placement: placement,
            tip_lamports: TIP_LAMPORTS,
        }
    }

    fn orchestrator(
        ledger: Arc<MockLedger>,
        relay: Arc<MockRelay>,
        plan: CyclePlan,
    ) -> (Orchestrator, ResultSubscription) {
        let (submitter, subscription) = SubmissionClient::connect(
            relay,
            SubscriptionConfig {
                poll_interval: Duration::from_millis(10),
                channel_capacity: 8,
            },
        );
        (
            Orchestrator::new(ledger, submitter, plan, CycleTimeouts::default()),
            subscription,
        )
    }

    fn programs(tx: &VersionedTransaction) -> Vec<Pubkey> {
        let keys = tx.message.static_account_keys();
        tx.message
            .instructions()
            .iter()
            .map(|ix| keys[ix.program_id_index as usize])
            .collect()
    }

    #[tokio::test]
    async fn test_embedded_tip_rides_on_last_payload() {
        let ledger = Arc::new(MockLedger::new());
        let relay = Arc::new(MockRelay::with_tip_accounts(2));
        let (orch, sub) =
            orchestrator(ledger, relay.clone(), plan(&["a", "b"], TipPlacement::Embedded));

        let cycle = orch.run_cycle(&Keypair::new()).await.unwrap();
        assert!(matches!(cycle.state(), CycleState::Submitted { .. }));

        let bundles = relay.submitted_bundles().await;
        let bundle = &bundles[0];
        assert_eq!(bundle.len(), 2);
        assert_eq!(programs(&bundle.transactions()[0]), vec![MEMO_PROGRAM_ID]);
        assert_eq!(
            programs(&bundle.transactions()[1]),
            vec![MEMO_PROGRAM_ID, system_program::id()]
        );
        sub.unsubscribe().await;
    }

    #[tokio::test]
    async fn test_tip_first_placement() {
        let ledger = Arc::new(MockLedger::new());
        let relay = Arc::new(MockRelay::with_tip_accounts(1));
        let (orch, sub) = orchestrator(ledger, relay.clone(), plan(&["a"], TipPlacement::First));

        orch.run_cycle(&Keypair::new()).await.unwrap();

        let bundles = relay.submitted_bundles().await;
        let bundle = &bundles[0];
        assert_eq!(programs(&bundle.transactions()[0]), vec![system_program::id()]);
        assert_eq!(programs(&bundle.transactions()[1]), vec![MEMO_PROGRAM_ID]);
        sub.unsubscribe().await;
    }

    #[tokio::test]
    async fn test_anchor_timeout_aborts_cycle() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set_delay(Duration::from_millis(200)).await;
        let relay = Arc::new(MockRelay::with_tip_accounts(1));
        let (submitter, sub) = SubmissionClient::connect(relay.clone(), SubscriptionConfig::default());
        let orch = Orchestrator::new(
            ledger,
            submitter,
            plan(&["a"], TipPlacement::Last),
            CycleTimeouts {
                anchor: Some(Duration::from_millis(20)),
                ..CycleTimeouts::default()
            },
        );

        let err = orch.run_cycle(&Keypair::new()).await.unwrap_err();
        assert!(matches!(err, BundleError::Timeout { operation: "recency anchor fetch", .. }));
        assert_eq!(relay.tip_account_calls(), 0);
        sub.unsubscribe().await;
    }

    #[tokio::test]
    async fn test_discovery_has_its_own_deadline() {
        let ledger = Arc::new(MockLedger::new());
        let relay = Arc::new(MockRelay::with_tip_accounts(1));
        relay.set_tip_account_delay(Duration::from_millis(200)).await;
        let (submitter, sub) = SubmissionClient::connect(relay.clone(), SubscriptionConfig::default());
        let orch = Orchestrator::new(
            ledger,
            submitter,
            plan(&["a"], TipPlacement::Last),
            CycleTimeouts {
                discovery: Some(Duration::from_millis(20)),
                submit: Some(Duration::from_secs(5)),
                ..CycleTimeouts::default()
            },
        );

        let err = orch.run_cycle(&Keypair::new()).await.unwrap_err();
        assert!(matches!(err, BundleError::Timeout { operation: "tip account discovery", .. }));
        assert_eq!(relay.submitted_count().await, 0);
        sub.unsubscribe().await;
    }

    #[tokio::test]
    async fn test_uncorrelated_results_are_ignored() {
        let ledger = Arc::new(MockLedger::new());
        let relay = Arc::new(MockRelay::with_tip_accounts(1));
        let (orch, sub) = orchestrator(ledger, relay, plan(&["a"], TipPlacement::Last));

        let mut cycle = orch.run_cycle(&Keypair::new()).await.unwrap();
        let foreign = BundleResult {
            bundle_id: BundleId::new("someone-else"),
            outcome: BundleOutcome::Landed,
            landed_slot: Some(9),
            context_slot: None,
            received_at: chrono::Utc::now(),
        };
        assert!(cycle.on_event(BundleEvent::Result(foreign)).unwrap().is_none());
        assert!(matches!(cycle.state(), CycleState::Submitted { .. }));

        let fault = cycle
            .on_event(BundleEvent::Fault(BundleError::stream_fault("reset")))
            .unwrap_err();
        assert!(matches!(fault, BundleError::StreamFault(_)));
        sub.unsubscribe().await;
    }

    #[tokio::test]
    async fn test_broadcast_note_uses_ledger() {
        let ledger = Arc::new(MockLedger::new());
        let relay = Arc::new(MockRelay::with_tip_accounts(1));
        let (orch, sub) = orchestrator(ledger.clone(), relay.clone(), plan(&[], TipPlacement::Last));

        orch.broadcast_note(&Keypair::new(), b"direct").await.unwrap();

        let sent = ledger.broadcasts().await;
        assert_eq!(sent.len(), 1);
        let tx: VersionedTransaction = bincode::deserialize(&sent[0]).unwrap();
        assert_eq!(*tx.message.recent_blockhash(), ledger.anchor());
        assert_eq!(relay.submitted_count().await, 0);
        sub.unsubscribe().await;
    }

    #[tokio::test]
    async fn test_embedded_without_notes_is_rejected() {
        let ledger = Arc::new(MockLedger::new());
        let relay = Arc::new(MockRelay::with_tip_accounts(1));
        let (orch, sub) = orchestrator(ledger, relay.clone(), plan(&[], TipPlacement::Embedded));

        let err = orch.run_cycle(&Keypair::new()).await.unwrap_err();
        assert!(matches!(err, BundleError::Configuration(_)));
        assert_eq!(relay.submitted_count().await, 0);
        sub.unsubscribe().await;
    }

    #[test]
    fn test_state_names() {
        assert_eq!(CycleState::Idle.name(), "idle");
        assert!(!CycleState::Idle.is_settled());
        let failed = CycleState::SubmissionFailed {
            error: BundleError::rejected("no"),
        };
        assert!(failed.is_settled());
        assert!(failed.ack().is_none());
    }
}
