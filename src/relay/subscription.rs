//! Submission client and bundle result subscription
//!
//! The subscription is established once, when the client connects, and
//! outlives any single bundle. A background task polls the relay for the
//! status of every bundle submitted through the client and forwards each
//! status change as a [`BundleEvent`] on a bounded channel. When the
//! consumer lags, the poller waits (backpressure) instead of dropping
//! results.
//!
//! Failure modes are kept apart:
//! - a failed `submit` is returned to its caller and leaves the
//!   subscription running
//! - a failed status poll ends the stream with a single
//!   `BundleEvent::Fault(BundleError::StreamFault)`

use crate::relay::{BundleAck, BundleEvent, BundleId, BundleOutcome, BundleResult, RelayClient};
use crate::tx_builder::{Bundle, BundleError, Result};
use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Most bundle ids the block engine accepts in one status request
pub const MAX_STATUS_IDS_PER_REQUEST: usize = 5;

/// Tuning for the result subscription
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionConfig {
    /// Delay between status polls
    pub poll_interval: Duration,
    /// Events buffered before the poller blocks
    pub channel_capacity: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1_000),
            channel_capacity: 64,
        }
    }
}

/// Sends bundles to the relay and registers them with the result stream
pub struct SubmissionClient {
    relay: Arc<dyn RelayClient>,
    tracker: mpsc::UnboundedSender<BundleId>,
}

/// Receiving end of the bundle result stream
pub struct ResultSubscription {
    events: mpsc::Receiver<BundleEvent>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl SubmissionClient {
    /// Connect to `relay` and establish the result subscription
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(
        relay: Arc<dyn RelayClient>,
        config: SubscriptionConfig,
    ) -> (Self, ResultSubscription) {
        let (tracker_tx, tracker_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(config.channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let poller = StatusPoller {
            relay: Arc::clone(&relay),
            poll_interval: config.poll_interval,
            tracked: HashMap::new(),
        };
        let handle = tokio::spawn(poller.run(tracker_rx, events_tx, shutdown_rx));

        info!(
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            channel_capacity = config.channel_capacity,
            "Bundle result subscription established"
        );

        (
            Self {
                relay,
                tracker: tracker_tx,
            },
            ResultSubscription {
                events: events_rx,
                shutdown: shutdown_tx,
                handle,
            },
        )
    }

    /// Tip accounts currently published by the relay
    pub async fn tip_accounts(&self) -> Result<Vec<Pubkey>> {
        self.relay.get_tip_accounts().await
    }

    /// Submit `bundle` and start tracking its result
    ///
    /// The acknowledgement only means the relay took the bundle into
    /// consideration. Errors are reported here and never reach the result
    /// stream.
    pub async fn submit(&self, bundle: &Bundle) -> Result<BundleAck> {
        let bundle_id = match self.relay.send_bundle(bundle).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, category = e.category(), "Bundle submission failed");
                return Err(e);
            }
        };

        if self.tracker.send(bundle_id.clone()).is_err() {
            warn!(bundle_id = %bundle_id, "Result subscription closed, bundle will not be tracked");
        }

        Ok(BundleAck {
            bundle_id,
            submitted_at: Utc::now(),
        })
    }
}

impl ResultSubscription {
    /// Next event, or `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<BundleEvent> {
        self.events.recv().await
    }

    /// Stop polling and wait for the background task to finish
    pub async fn unsubscribe(self) {
        let Self {
            events,
            shutdown,
            handle,
        } = self;
        let _ = shutdown.send(());
        // Unblocks a poller waiting on a full channel
        drop(events);
        if let Err(e) = handle.await {
            error!(error = %e, "Result poller task panicked");
        }
        debug!("Bundle result subscription closed");
    }
}

struct StatusPoller {
    relay: Arc<dyn RelayClient>,
    poll_interval: Duration,
    /// Last outcome emitted per tracked bundle
    tracked: HashMap<BundleId, Option<BundleOutcome>>,
}

impl StatusPoller {
    async fn run(
        mut self,
        mut tracker: mpsc::UnboundedReceiver<BundleId>,
        events: mpsc::Sender<BundleEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        // First poll one interval after connecting, not immediately
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(id) = tracker.recv() => {
                    debug!(bundle_id = %id, "Tracking bundle");
                    self.tracked.entry(id).or_insert(None);
                }
                _ = ticker.tick() => {
                    if self.tracked.is_empty() {
                        continue;
                    }
                    if let Err(fault) = self.poll_once(&events).await {
                        error!(error = %fault, "Bundle result stream fault");
                        let _ = events.send(BundleEvent::Fault(fault)).await;
                        break;
                    }
                    if events.is_closed() {
                        break;
                    }
                }
            }
        }
    }

    /// Poll every tracked bundle once and emit the changed statuses
    async fn poll_once(&mut self, events: &mpsc::Sender<BundleEvent>) -> Result<()> {
        let ids: Vec<BundleId> = self.tracked.keys().cloned().collect();
        let mut statuses = Vec::with_capacity(ids.len());
        for batch in ids.chunks(MAX_STATUS_IDS_PER_REQUEST) {
            let batch_statuses = self
                .relay
                .get_bundle_statuses(batch)
                .await
                .map_err(|e| BundleError::stream_fault(e.to_string()))?;
            statuses.extend(batch_statuses);
        }

        for status in statuses {
            let Some(last) = self.tracked.get(&status.bundle_id) else {
                continue;
            };
            if *last == Some(status.outcome) {
                continue;
            }

            let outcome = status.outcome;
            let bundle_id = status.bundle_id.clone();
            if outcome.is_terminal() {
                self.tracked.remove(&bundle_id);
            } else {
                self.tracked.insert(bundle_id.clone(), Some(outcome));
            }

            if events
                .send(BundleEvent::Result(BundleResult::from(status)))
                .await
                .is_err()
            {
                debug!(bundle_id = %bundle_id, "Result receiver dropped");
                return Ok(());
            }
        }
        Ok(())
    }
}
