use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::fs;
use std::path::Path;

use super::block::Block;
use super::chain::{Ledger, LedgerError, MinedBlock};
use super::crypto::{Address, CryptoError, KeyPair};
use super::transaction::Transaction;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Backup file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed backup: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backup public key {expected} does not match its private key ({actual})")]
    KeyMismatch { expected: String, actual: String },
}

/// Key material as written to a backup file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletBackup {
    /// Base58 address
    pub public_key: String,
    /// Hex encoded ed25519 secret key
    pub private_key: String,
}

/// What a successful `send_money` produced
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub transaction: Transaction,
    /// Index of the block sealing `transaction`
    pub block_index: u64,
    /// The block sealing `transaction`
    pub mined: MinedBlock,
    /// Blocks sealing transactions that were queued ahead of this one
    pub sealed_before: Vec<MinedBlock>,
}

/// A key pair bound to a ledger handle
#[derive(Debug, Clone)]
pub struct Wallet {
    key_pair: KeyPair,
    ledger: Ledger,
}

impl Wallet {
    /// Generates a key pair and grants the configured starting balance
    pub fn new(ledger: &Ledger) -> Result<Self, WalletError> {
        let key_pair = KeyPair::generate();
        ledger.grant(key_pair.address(), ledger.config().starting_balance)?;
        info!("Created wallet {}", key_pair.address());

        Ok(Wallet {
            key_pair,
            ledger: ledger.clone(),
        })
    }

    pub fn address(&self) -> &Address {
        self.key_pair.address()
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// Signs a transfer to `payee`, submits it and mines until it is sealed,
    /// with this wallet as miner.
    ///
    /// Older pending transfers are sealed first and their rewards also go to
    /// this wallet. A rejected transfer leaves the ledger unchanged. When
    /// mining gives up after acceptance the transfer stays pending and the
    /// mining error is returned.
    pub fn send_money(&self, amount: u64, payee: &Address) -> Result<SendReceipt, WalletError> {
        let mut transaction = Transaction::new(
            amount,
            self.address().clone(),
            payee.clone(),
            self.ledger.config().transaction_fee,
        );
        transaction.sign(&self.key_pair);

        let mut sealed = self
            .ledger
            .submit_and_mine(transaction.clone(), self.address())?;

        let mined = match sealed.pop() {
            Some(mined) if mined.block.transaction == transaction => mined,
            _ => {
                return Err(LedgerError::InvalidChain(
                    "mined block does not carry the submitted transaction".to_string(),
                )
                .into())
            }
        };

        Ok(SendReceipt {
            transaction,
            block_index: mined.index,
            mined,
            sealed_before: sealed,
        })
    }

    pub fn balance(&self) -> u64 {
        self.ledger.get_balance(self.address())
    }

    /// The full chain, as every wallet sees the same history
    pub fn transaction_history(&self) -> Vec<Block> {
        self.ledger.get_chain()
    }

    pub fn to_backup(&self) -> WalletBackup {
        WalletBackup {
            public_key: self.address().0.clone(),
            private_key: self.key_pair.export_secret_hex(),
        }
    }

    /// Rebuilds a wallet from backed-up keys without granting a new balance
    pub fn from_backup(backup: &WalletBackup, ledger: &Ledger) -> Result<Self, WalletError> {
        let key_pair = KeyPair::from_secret_hex(&backup.private_key)?;

        if key_pair.address().0 != backup.public_key {
            return Err(WalletError::KeyMismatch {
                expected: backup.public_key.clone(),
                actual: key_pair.address().0.clone(),
            });
        }

        info!("Restored wallet {}", key_pair.address());
        Ok(Wallet {
            key_pair,
            ledger: ledger.clone(),
        })
    }

    /// Writes `{"publicKey": .., "privateKey": ..}` to `path`
    pub fn backup<P: AsRef<Path>>(&self, path: P) -> Result<(), WalletError> {
        let contents = serde_json::to_string_pretty(&self.to_backup())?;
        fs::write(path.as_ref(), contents)?;
        info!("Wallet {} backed up to {}", self.address(), path.as_ref().display());
        Ok(())
    }

    pub fn restore<P: AsRef<Path>>(path: P, ledger: &Ledger) -> Result<Self, WalletError> {
        let contents = fs::read_to_string(path)?;
        let backup: WalletBackup = serde_json::from_str(&contents)?;
        Self::from_backup(&backup, ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::config::LedgerConfig;
    use crate::ledger::transaction::TransactionError;

    fn test_ledger() -> Ledger {
        Ledger::with_config(LedgerConfig {
            difficulty: 1,
            ..LedgerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_wallet_gets_starting_balance() {
        let ledger = test_ledger();
        let wallet = Wallet::new(&ledger).unwrap();

        assert_eq!(wallet.balance(), 100);
        assert_eq!(ledger.get_balance(wallet.address()), 100);
        assert_eq!(wallet.transaction_history().len(), 1);
    }

    #[test]
    fn test_send_money() {
        let ledger = test_ledger();
        let alice = Wallet::new(&ledger).unwrap();
        let bob = Wallet::new(&ledger).unwrap();

        let receipt = alice.send_money(50, bob.address()).unwrap();

        assert_eq!(receipt.block_index, 1);
        assert_eq!(receipt.mined.index, 1);
        assert_eq!(receipt.transaction.fee, 2);
        assert!(receipt.transaction.verify());
        assert_eq!(alice.balance(), 48 + 50);
        assert_eq!(bob.balance(), 150);
        assert_eq!(bob.transaction_history().len(), 2);
    }

    #[test]
    fn test_send_money_behind_pending_transfer() {
        let ledger = test_ledger();
        let alice = Wallet::new(&ledger).unwrap();
        let carol = Wallet::new(&ledger).unwrap();
        let bob = Address::from("bob");

        let mut queued = Transaction::with_default_fee(7, carol.address().clone(), bob.clone());
        queued.sign(carol.key_pair());
        ledger.submit_transaction(queued.clone()).unwrap();

        let receipt = alice.send_money(50, &bob).unwrap();

        assert_eq!(receipt.mined.block.transaction, receipt.transaction);
        assert_eq!(receipt.block_index, 2);
        assert_eq!(receipt.mined.index, 2);
        assert_eq!(receipt.sealed_before.len(), 1);
        assert_eq!(receipt.sealed_before[0].block.transaction, queued);
        assert!(ledger.get_pending_transactions().is_empty());
        assert_eq!(alice.balance(), 100 - 52 + 2 * 50);
        assert_eq!(carol.balance(), 91);
        assert_eq!(ledger.get_balance(&bob), 57);
    }

    #[test]
    fn test_send_money_rejected() {
        let ledger = test_ledger();
        let alice = Wallet::new(&ledger).unwrap();

        let err = alice.send_money(99, &Address::from("bob")).unwrap_err();

        assert!(matches!(
            err,
            WalletError::Ledger(LedgerError::TransactionError(
                TransactionError::InsufficientBalance { .. }
            ))
        ));
        assert_eq!(alice.balance(), 100);
        assert_eq!(ledger.chain_len(), 1);
    }

    #[test]
    fn test_backup_and_restore() {
        let ledger = test_ledger();
        let wallet = Wallet::new(&ledger).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");

        wallet.backup(&path).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["publicKey"], wallet.address().0);
        assert!(json["privateKey"].is_string());

        let restored = Wallet::restore(&path, &ledger).unwrap();
        assert_eq!(restored.address(), wallet.address());
        assert_eq!(restored.balance(), 100);

        // The restored keys still sign valid transfers
        restored.send_money(10, &Address::from("carol")).unwrap();
        assert_eq!(wallet.balance(), 88 + 50);
    }

    #[test]
    fn test_restore_rejects_mismatched_keys() {
        let ledger = test_ledger();
        let wallet = Wallet::new(&ledger).unwrap();
        let other = Wallet::new(&ledger).unwrap();

        let backup = WalletBackup {
            public_key: other.address().0.clone(),
            private_key: wallet.to_backup().private_key,
        };

        assert!(matches!(
            Wallet::from_backup(&backup, &ledger),
            Err(WalletError::KeyMismatch { .. })
        ));
    }

    #[test]
    fn test_restore_rejects_garbage() {
        let ledger = test_ledger();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(Wallet::restore(&path, &ledger), Err(WalletError::Json(_))));
        assert!(matches!(
            Wallet::restore(dir.path().join("missing.json"), &ledger),
            Err(WalletError::Io(_))
        ));
    }
}
