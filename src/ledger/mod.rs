// Ledger module
//
// This module contains the core ledger implementation including:
// - Key pairs, identities and signatures
// - Transaction structure and its canonical payload
// - Block structure and content hashing
// - Balance table
// - Proof of work puzzle
// - The ledger itself and difficulty adjustment
// - Wallets

pub mod account;
pub mod block;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod pow;
pub mod transaction;
pub mod wallet;

// Re-export main components for easier access
pub use block::Block;
pub use chain::{ChainSnapshot, Ledger, LedgerError, MinedBlock, MiningOutcome};
pub use config::{AppConfig, LedgerConfig, ServerConfig};
pub use crypto::{Address, DigitalSignature, KeyPair};
pub use transaction::Transaction;
pub use wallet::{SendReceipt, Wallet, WalletBackup, WalletError};
