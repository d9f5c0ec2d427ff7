use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::sync::Arc;

use super::crypto::Address;

/// Errors that can occur during account operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Balance overflow for account {0}")]
    Overflow(Address),
}

/// A balance-table entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Account {
    pub address: Address,
    pub balance: u64,
}

/// Authoritative balances keyed by identity.
///
/// Absent identities read as zero. Reads are lock free; the ledger
/// serializes every mutation that must stay consistent with the chain.
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    balances: Arc<DashMap<Address, u64>>,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.balances.get(address).map(|entry| *entry).unwrap_or(0)
    }

    /// Adds `amount` to the account, creating it when absent
    pub fn deposit(&self, address: &Address, amount: u64) -> Result<u64, AccountError> {
        let mut entry = self.balances.entry(address.clone()).or_insert(0);
        let updated = entry
            .checked_add(amount)
            .ok_or_else(|| AccountError::Overflow(address.clone()))?;
        *entry = updated;
        Ok(updated)
    }

    /// Removes `amount` from the account
    pub fn withdraw(&self, address: &Address, amount: u64) -> Result<u64, AccountError> {
        let Some(mut entry) = self.balances.get_mut(address) else {
            if amount == 0 {
                return Ok(0);
            }
            return Err(AccountError::InsufficientBalance {
                required: amount,
                available: 0,
            });
        };
        if *entry < amount {
            return Err(AccountError::InsufficientBalance {
                required: amount,
                available: *entry,
            });
        }
        *entry -= amount;
        Ok(*entry)
    }

    /// Debits `amount + fee` from `from` and credits `amount` to `to`.
    ///
    /// Either both sides are applied or neither is.
    pub fn transfer(
        &self,
        from: &Address,
        to: &Address,
        amount: u64,
        fee: u64,
    ) -> Result<(), AccountError> {
        let total = amount
            .checked_add(fee)
            .ok_or_else(|| AccountError::Overflow(from.clone()))?;

        self.withdraw(from, total)?;

        if let Err(err) = self.deposit(to, amount) {
            // Cannot overflow: the same amount was just removed
            let _ = self.deposit(from, total);
            return Err(err);
        }

        Ok(())
    }

    /// Snapshot of every account, sorted by address
    pub fn get_all_accounts(&self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self
            .balances
            .iter()
            .map(|entry| Account {
                address: entry.key().clone(),
                balance: *entry.value(),
            })
            .collect();
        accounts.sort_by(|a, b| a.address.cmp(&b.address));
        accounts
    }

    /// Sum of all balances
    pub fn total_supply(&self) -> u128 {
        self.balances.iter().map(|entry| *entry.value() as u128).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_account_reads_zero() {
        let state = AccountState::new();
        assert_eq!(state.balance(&Address::from("nobody")), 0);
        assert!(state.get_all_accounts().is_empty());
    }

    #[test]
    fn test_deposit_and_withdraw() {
        let state = AccountState::new();
        let address = Address::from("test_address");

        assert_eq!(state.deposit(&address, 100).unwrap(), 100);
        assert_eq!(state.withdraw(&address, 40).unwrap(), 60);

        let result = state.withdraw(&address, 100);
        assert_eq!(
            result,
            Err(AccountError::InsufficientBalance {
                required: 100,
                available: 60
            })
        );
        assert_eq!(state.balance(&address), 60);
    }

    #[test]
    fn test_deposit_overflow() {
        let state = AccountState::new();
        let address = Address::from("rich");

        state.deposit(&address, u64::MAX).unwrap();
        assert!(matches!(state.deposit(&address, 1), Err(AccountError::Overflow(_))));
        assert_eq!(state.balance(&address), u64::MAX);
    }

    #[test]
    fn test_transfer() {
        let state = AccountState::new();
        let sender = Address::from("sender");
        let recipient = Address::from("recipient");
        state.deposit(&sender, 100).unwrap();

        state.transfer(&sender, &recipient, 50, 2).unwrap();

        assert_eq!(state.balance(&sender), 48);
        assert_eq!(state.balance(&recipient), 50);
        assert_eq!(state.total_supply(), 98);
    }

    #[test]
    fn test_failed_transfer_changes_nothing() {
        let state = AccountState::new();
        let sender = Address::from("sender");
        let recipient = Address::from("recipient");
        state.deposit(&sender, 10).unwrap();
        state.deposit(&recipient, u64::MAX).unwrap();

        assert!(state.transfer(&sender, &recipient, 20, 0).is_err());
        assert!(state.transfer(&sender, &recipient, 5, 0).is_err());

        assert_eq!(state.balance(&sender), 10);
        assert_eq!(state.balance(&recipient), u64::MAX);
    }

    #[test]
    fn test_self_transfer_costs_only_fee() {
        let state = AccountState::new();
        let me = Address::from("me");
        state.deposit(&me, 10).unwrap();

        state.transfer(&me, &me, 5, 2).unwrap();
        assert_eq!(state.balance(&me), 8);
    }
}
