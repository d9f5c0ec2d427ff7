//! Educational single-process ledger: signed transactions, one per block,
//! sealed by an MD5 proof-of-work puzzle and linked by SHA-256 content hashes.

pub mod api;
pub mod ledger;

pub use ledger::{
    Address, AppConfig, Block, Ledger, LedgerConfig, LedgerError, MiningOutcome, Transaction,
    Wallet, WalletError,
};
