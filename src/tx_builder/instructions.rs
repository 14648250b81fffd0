//! Instruction construction for bundle transactions
//!
//! Two instruction kinds make up every bundle this crate builds:
//! 1. A note instruction addressed to the SPL Memo program, carrying an
//!    opaque application payload signed by the submitter
//! 2. A native SOL transfer paying the relay tip
//!
//! Both are stateless constructors. Neither inspects the payload nor
//! touches the network.

use crate::tx_builder::errors::{BundleError, Result};
#[allow(deprecated)]
use solana_sdk::system_instruction;
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

/// SPL Memo program, the well-known notarization target for payloads
pub const MEMO_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("Memo1UhkJRfHyvLMcVucJwxXeuD728EqVDDwQDxFMNo");

/// Fixed tip paid to the relay per bundle, in lamports
pub const TIP_LAMPORTS: u64 = 1_000;

/// Build the note instruction for `payload`
///
/// The signer is the only account and is marked signer + writable. The
/// payload bytes are used verbatim as instruction data; no size limit is
/// imposed here, the ledger enforces its own packet limit downstream.
pub fn note_instruction(signer: &Pubkey, payload: &[u8]) -> Instruction {
    Instruction::new_with_bytes(
        MEMO_PROGRAM_ID,
        payload,
        vec![AccountMeta::new(*signer, true)],
    )
}

/// Build the tip transfer instruction
///
/// # Errors
///
/// Returns [`BundleError::InvalidTipAmount`] if `lamports` is zero.
pub fn tip_instruction(payer: &Pubkey, tip_account: &Pubkey, lamports: u64) -> Result<Instruction> {
    if lamports == 0 {
        return Err(BundleError::InvalidTipAmount(lamports));
    }
    #[allow(deprecated)]
    let ix = system_instruction::transfer(payer, tip_account, lamports);
    Ok(ix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::system_program;

    #[test]
    fn test_note_instruction_shape() {
        let signer = Pubkey::new_unique();
        let ix = note_instruction(&signer, b"bundle note 1");

        assert_eq!(ix.program_id, MEMO_PROGRAM_ID);
        assert_eq!(ix.data, b"bundle note 1".to_vec());
        assert_eq!(ix.accounts.len(), 1);
        assert_eq!(ix.accounts[0].pubkey, signer);
        assert!(ix.accounts[0].is_signer);
        assert!(ix.accounts[0].is_writable);
    }

    #[test]
    fn test_note_instruction_keeps_empty_payload() {
        let ix = note_instruction(&Pubkey::new_unique(), &[]);
        assert!(ix.data.is_empty());
    }

    #[test]
    fn test_tip_instruction_targets_system_program() {
        let payer = Pubkey::new_unique();
        let tip_account = Pubkey::new_unique();
        let ix = tip_instruction(&payer, &tip_account, TIP_LAMPORTS).unwrap();

        assert_eq!(ix.program_id, system_program::id());
        assert_eq!(ix.accounts[0].pubkey, payer);
        assert!(ix.accounts[0].is_signer);
        assert_eq!(ix.accounts[1].pubkey, tip_account);
        assert!(!ix.accounts[1].is_signer);
    }

    #[test]
    fn test_zero_tip_rejected() {
        let err = tip_instruction(&Pubkey::new_unique(), &Pubkey::new_unique(), 0).unwrap_err();
        assert!(matches!(err, BundleError::InvalidTipAmount(0)));
    }
}
