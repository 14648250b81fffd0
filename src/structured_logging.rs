//! Structured logging for submission cycles

use crate::observability::CorrelationId;
use crate::relay::{BundleAck, BundleResult};
use crate::tx_builder::BundleError;

/// Structured logger scoped to one submission cycle
#[derive(Debug, Clone)]
pub struct CycleLogger {
    correlation_id: CorrelationId,
}

impl CycleLogger {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self { correlation_id }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn log_transition(&self, from: &str, to: &str) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            from = %from,
            to = %to,
            "Cycle state transition"
        );
    }

    pub fn log_tip_account(&self, tip_account: &str, candidates: usize) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            tip_account = %tip_account,
            candidates = %candidates,
            "Selected tip account"
        );
    }

    pub fn log_bundle_assembled(&self, signatures: &[String], capacity: usize) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            tx_count = %signatures.len(),
            capacity = %capacity,
            signatures = ?signatures,
            "Bundle assembled"
        );
    }

    pub fn log_submitted(&self, ack: &BundleAck, latency_ms: u64) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            bundle_id = %ack.bundle_id,
            latency_ms = %latency_ms,
            "Bundle accepted for consideration"
        );
    }

    pub fn log_submission_failed(&self, error: &BundleError) {
        tracing::error!(
            correlation_id = %self.correlation_id,
            category = %error.category(),
            error = %error,
            "Bundle submission failed"
        );
    }

    pub fn log_aborted(&self, state: &str, error: &BundleError) {
        tracing::error!(
            correlation_id = %self.correlation_id,
            state = %state,
            category = %error.category(),
            error = %error,
            "Submission cycle aborted"
        );
    }

    pub fn log_result(&self, result: &BundleResult) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            bundle_id = %result.bundle_id,
            outcome = %result.outcome,
            landed_slot = ?result.landed_slot,
            context_slot = ?result.context_slot,
            "Bundle result observed"
        );
    }
}
