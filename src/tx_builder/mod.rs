//! Bundle transaction construction
//!
//! This module turns a signer, a recency anchor and a list of notes into a
//! tipped bundle ready for the relay:
//! - **instructions**: memo note and tip transfer instructions
//! - **builder**: signed payload and tip transactions
//! - **destination**: random tip account selection
//! - **bundle**: size-bounded, order-preserving bundle assembly
//! - **errors**: the error taxonomy shared by the whole crate
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use bundle_submitter::tx_builder::{
//!     assemble_bundle, build_incentive_transaction, build_payload_transaction,
//!     select_tip_account, BundleError, TIP_LAMPORTS,
//! };
//! use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Keypair};
//!
//! # fn example(keypair: Keypair, anchor: Hash, tip_accounts: Vec<Pubkey>) -> Result<(), BundleError> {
//! let tip_account = select_tip_account(&tip_accounts)?;
//! let tip_tx = build_incentive_transaction(&keypair, &tip_account, TIP_LAMPORTS, anchor)?;
//! let note_tx = build_payload_transaction(&keypair, b"hello", anchor, None)?;
//!
//! let bundle = assemble_bundle(vec![note_tx, tip_tx], 5)?;
//! assert_eq!(bundle.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub use errors::{BundleError, Result};

mod builder;
mod bundle;
mod destination;
mod instructions;

pub use builder::{build_incentive_transaction, build_payload_transaction, first_signature_b58};
pub use bundle::{assemble_bundle, Bundle, TipPlacement, DEFAULT_BUNDLE_CAPACITY};
pub use destination::{select_tip_account, select_tip_account_with};
pub use instructions::{note_instruction, tip_instruction, MEMO_PROGRAM_ID, TIP_LAMPORTS};
