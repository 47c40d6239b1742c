//! In-memory ledger.
//!
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;

use super::{LedgerError, TokenLedger};
use crate::core::ids::Address;

/// (token, owner) key.
type AccountKey = (Address, Address);

/// Ledger kept entirely in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedger {
    balances: BTreeMap<AccountKey, u128>,
    allowances: BTreeMap<AccountKey, u128>,
    escrow: BTreeMap<Address, u128>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` of `token` to `owner`.
    pub fn mint(&mut self, token: &Address, owner: &Address, amount: u128) -> Result<(), LedgerError> {
        let balance = self.balances.entry((*token, *owner)).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    /// Ledger with `token` balances already credited.
    pub fn with_genesis(token: &Address, accounts: &[(Address, u128)]) -> Result<Self, LedgerError> {
        let mut ledger = Self::new();
        for (owner, amount) in accounts {
            ledger.mint(token, owner, *amount)?;
        }
        Ok(ledger)
    }

    /// Sum of all balances plus escrow for `token`.
    pub fn total_supply(&self, token: &Address) -> u128 {
        let held: u128 = self
            .balances
            .iter()
            .filter(|((t, _), _)| t == token)
            .map(|(_, amount)| *amount)
            .sum();
        held + self.escrowed(token)
    }
}

impl TokenLedger for InMemoryLedger {
    fn balance_of(&self, token: &Address, owner: &Address) -> u128 {
        self.balances.get(&(*token, *owner)).copied().unwrap_or(0)
    }

    fn allowance(&self, token: &Address, owner: &Address) -> u128 {
        self.allowances.get(&(*token, *owner)).copied().unwrap_or(0)
    }

    fn escrowed(&self, token: &Address) -> u128 {
        self.escrow.get(token).copied().unwrap_or(0)
    }

    fn approve(&mut self, token: &Address, owner: &Address, amount: u128) {
        self.allowances.insert((*token, *owner), amount);
    }

    fn escrow(&mut self, token: &Address, from: &Address, amount: u128) -> Result<(), LedgerError> {
        let approved = self.allowance(token, from);
        if approved < amount {
            return Err(LedgerError::InsufficientAllowance { needed: amount, approved });
        }

        let available = self.balance_of(token, from);
        if available < amount {
            return Err(LedgerError::InsufficientFunds { needed: amount, available });
        }

        let held = self.escrowed(token);
        let new_held = held.checked_add(amount).ok_or(LedgerError::Overflow)?;

        // All checks done; apply.
        self.allowances.insert((*token, *from), approved - amount);
        self.balances.insert((*token, *from), available - amount);
        self.escrow.insert(*token, new_held);
        Ok(())
    }

    fn release(&mut self, token: &Address, to: &Address, amount: u128) -> Result<(), LedgerError> {
        let held = self.escrowed(token);
        if held < amount {
            return Err(LedgerError::EscrowShortfall { needed: amount, held });
        }

        let balance = self.balance_of(token, to);
        let new_balance = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;

        self.escrow.insert(*token, held - amount);
        self.balances.insert((*token, *to), new_balance);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> Address {
        Address::new([0xee; 20])
    }

    fn alice() -> Address {
        Address::new([1; 20])
    }

    #[test]
    fn test_escrow_and_release() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&token(), &alice(), 500).unwrap();
        ledger.approve(&token(), &alice(), 200);

        ledger.escrow(&token(), &alice(), 150).unwrap();
        assert_eq!(ledger.balance_of(&token(), &alice()), 350);
        assert_eq!(ledger.allowance(&token(), &alice()), 50);
        assert_eq!(ledger.escrowed(&token()), 150);

        ledger.release(&token(), &alice(), 150).unwrap();
        assert_eq!(ledger.balance_of(&token(), &alice()), 500);
        assert_eq!(ledger.escrowed(&token()), 0);
        assert_eq!(ledger.total_supply(&token()), 500);
    }

    #[test]
    fn test_allowance_checked_before_balance() {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&token(), &alice(), 10).unwrap();

        let err = ledger.escrow(&token(), &alice(), 100).unwrap_err();
        assert_eq!(err, LedgerError::InsufficientAllowance { needed: 100, approved: 0 });

        ledger.approve(&token(), &alice(), 100);
        let err = ledger.escrow(&token(), &alice(), 100).unwrap_err();
        assert_eq!(err, LedgerError::InsufficientFunds { needed: 100, available: 10 });

        // Nothing moved
        assert_eq!(ledger.balance_of(&token(), &alice()), 10);
        assert_eq!(ledger.allowance(&token(), &alice()), 100);
        assert_eq!(ledger.escrowed(&token()), 0);
    }

    #[test]
    fn test_genesis() {
        let bob = Address::new([2; 20]);
        let ledger = InMemoryLedger::with_genesis(&token(), &[(alice(), 70), (bob, 30)]).unwrap();
        assert_eq!(ledger.balance_of(&token(), &bob), 30);
        assert_eq!(ledger.total_supply(&token()), 100);

        let err = InMemoryLedger::with_genesis(&token(), &[(alice(), u128::MAX), (alice(), 1)]).unwrap_err();
        assert_eq!(err, LedgerError::Overflow);
    }

    #[test]
    fn test_release_shortfall() {
        let mut ledger = InMemoryLedger::new();
        let err = ledger.release(&token(), &alice(), 1).unwrap_err();
        assert_eq!(err, LedgerError::EscrowShortfall { needed: 1, held: 0 });
    }
}
