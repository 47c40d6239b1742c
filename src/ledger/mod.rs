//! Token Ledger Interface
//!
//! The protocol never holds balances itself. It asks the ledger to move a
//! stake into escrow and to release escrowed funds to a recipient. Each call
//! either fully applies or returns an error with nothing changed.

pub mod memory;

use thiserror::Error;

use crate::core::ids::Address;

pub use memory::InMemoryLedger;

/// Ledger errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// Balance too low.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        /// Amount requested.
        needed: u128,
        /// Balance held.
        available: u128,
    },

    /// Escrow allowance too low.
    #[error("insufficient allowance: need {needed}, approved {approved}")]
    InsufficientAllowance {
        /// Amount requested.
        needed: u128,
        /// Amount approved.
        approved: u128,
    },

    /// Escrow holds less than the release amount.
    #[error("escrow shortfall: need {needed}, held {held}")]
    EscrowShortfall {
        /// Amount requested.
        needed: u128,
        /// Amount held in escrow.
        held: u128,
    },

    /// Balance arithmetic overflowed.
    #[error("balance overflow")]
    Overflow,
}

/// Escrow-capable token ledger.
pub trait TokenLedger {
    /// Spendable balance of `owner` in `token`.
    fn balance_of(&self, token: &Address, owner: &Address) -> u128;

    /// Amount `owner` has approved for escrow in `token`.
    fn allowance(&self, token: &Address, owner: &Address) -> u128;

    /// Total held in escrow for `token`.
    fn escrowed(&self, token: &Address) -> u128;

    /// Set how much of `token` the protocol may escrow from `owner`.
    fn approve(&mut self, token: &Address, owner: &Address, amount: u128);

    /// Move `amount` from `from` into escrow, consuming allowance.
    fn escrow(&mut self, token: &Address, from: &Address, amount: u128) -> Result<(), LedgerError>;

    /// Pay `amount` out of escrow to `to`.
    fn release(&mut self, token: &Address, to: &Address, amount: u128) -> Result<(), LedgerError>;
}
