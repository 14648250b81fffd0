//! Signed transaction builders
//!
//! Both builders compile a v0 message with the signer as fee payer and the
//! caller-supplied recency anchor, then sign it with exactly that signer.
//! Signing is the last step: the returned transaction is never mutated
//! afterwards. No network I/O happens here, so every transaction in a
//! bundle is built against the one anchor the caller fetched.

use crate::tx_builder::errors::{BundleError, Result};
use crate::tx_builder::instructions::{note_instruction, tip_instruction};
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::VersionedTransaction,
};
use tracing::{debug, info};

/// Build a signed transaction carrying `payload` as a memo note
///
/// The note instruction comes first; `extra_ix`, when given, is appended
/// after it (used to embed the tip in the final payload transaction).
pub fn build_payload_transaction(
    signer: &Keypair,
    payload: &[u8],
    anchor: Hash,
    extra_ix: Option<Instruction>,
) -> Result<VersionedTransaction> {
    let mut instructions = Vec::with_capacity(2);
    instructions.push(note_instruction(&signer.pubkey(), payload));
    if let Some(ix) = extra_ix {
        instructions.push(ix);
    }

    let tx = compile_and_sign(signer, &instructions, anchor)?;

    info!(
        signature = %first_signature_b58(&tx),
        payload_len = payload.len(),
        "Built payload transaction"
    );
    Ok(tx)
}

/// Build a signed transaction transferring `lamports` to `tip_account`
///
/// # Errors
///
/// [`BundleError::InvalidTipAmount`] when `lamports` is zero.
pub fn build_incentive_transaction(
    payer: &Keypair,
    tip_account: &Pubkey,
    lamports: u64,
    anchor: Hash,
) -> Result<VersionedTransaction> {
    let ix = tip_instruction(&payer.pubkey(), tip_account, lamports)?;
    let tx = compile_and_sign(payer, &[ix], anchor)?;

    debug!(
        signature = %first_signature_b58(&tx),
        tip_account = %tip_account,
        lamports,
        "Built tip transaction"
    );
    Ok(tx)
}

/// Base-58 encoding of the transaction's first (fee payer) signature
pub fn first_signature_b58(tx: &VersionedTransaction) -> String {
    tx.signatures
        .first()
        .map(|sig| bs58::encode(sig).into_string())
        .unwrap_or_default()
}

fn compile_and_sign(
    signer: &Keypair,
    instructions: &[Instruction],
    anchor: Hash,
) -> Result<VersionedTransaction> {
    let message = v0::Message::try_compile(&signer.pubkey(), instructions, &[], anchor)
        .map_err(|e| BundleError::MessageCompile(e.to_string()))?;

    VersionedTransaction::try_new(VersionedMessage::V0(message), &[signer])
        .map_err(|e| BundleError::Signing(e.to_string()))
}
