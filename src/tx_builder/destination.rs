//! Tip account selection
//!
//! The relay publishes a small, changing set of tip accounts. One is
//! drawn uniformly at random per submission; draws are independent and
//! nothing is remembered between them.

use crate::tx_builder::errors::{BundleError, Result};
use solana_sdk::pubkey::Pubkey;

/// Pick one tip account uniformly at random
///
/// # Errors
///
/// [`BundleError::EmptyCandidateSet`] when `candidates` is empty. The
/// caller aborts the cycle; there is no fallback account.
pub fn select_tip_account(candidates: &[Pubkey]) -> Result<Pubkey> {
    select_tip_account_with(&mut fastrand::Rng::new(), candidates)
}

/// Same as [`select_tip_account`] with a caller-provided generator
pub fn select_tip_account_with(rng: &mut fastrand::Rng, candidates: &[Pubkey]) -> Result<Pubkey> {
    if candidates.is_empty() {
        return Err(BundleError::EmptyCandidateSet);
    }
    Ok(candidates[rng.usize(..candidates.len())])
}
