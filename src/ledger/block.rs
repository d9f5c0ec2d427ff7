use chrono::{DateTime, SubsecRound, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::transaction::Transaction;

/// Upper bound of the random nonce assigned at construction
pub const MAX_SEED_NONCE: u64 = 999_999_999;

/// One link of the chain, sealing exactly one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Block {
    /// Content hash of the preceding block, empty for genesis
    pub previous_hash: String,

    /// The transaction sealed by this block
    pub transaction: Transaction,

    /// Timestamp when the block was created
    #[schema(value_type = String, example = "2023-01-01T12:00:00.000Z")]
    pub timestamp: DateTime<Utc>,

    /// Random seed at construction, proof-of-work solution once mined
    pub nonce: u64,

    /// Difficulty the nonce was mined against
    pub difficulty: u32,
}

#[derive(Serialize)]
struct CanonicalTransaction<'a> {
    amount: u64,
    fee: u64,
    payee: &'a str,
    payer: &'a str,
    signature: Option<&'a str>,
    timestamp: i64,
}

#[derive(Serialize)]
struct CanonicalBlock<'a> {
    difficulty: u32,
    nonce: u64,
    previous_hash: &'a str,
    timestamp: i64,
    transaction: CanonicalTransaction<'a>,
}

impl Block {
    /// Creates a block stamped now with a random seed nonce. Nothing is hashed.
    pub fn new(previous_hash: String, transaction: Transaction) -> Self {
        Self::with_timestamp(previous_hash, transaction, Utc::now())
    }

    pub fn with_timestamp(
        previous_hash: String,
        transaction: Transaction,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Block {
            previous_hash,
            transaction,
            timestamp: timestamp.trunc_subsecs(3),
            nonce: rand::thread_rng().gen_range(0..=MAX_SEED_NONCE),
            difficulty: 0,
        }
    }

    /// SHA-256 content hash as lowercase hex.
    ///
    /// Recomputed from the current fields on every call.
    pub fn hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn canonical_bytes(&self) -> Vec<u8> {
        let transaction = &self.transaction;
        let content = CanonicalBlock {
            difficulty: self.difficulty,
            nonce: self.nonce,
            previous_hash: &self.previous_hash,
            timestamp: self.timestamp.timestamp_millis(),
            transaction: CanonicalTransaction {
                amount: transaction.amount,
                fee: transaction.fee,
                payee: transaction.payee.as_str(),
                payer: transaction.payer.as_str(),
                signature: transaction.signature.as_ref().map(|s| s.0.as_str()),
                timestamp: transaction.timestamp.timestamp_millis(),
            },
        };

        serde_json::to_vec(&content).unwrap_or_default()
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::crypto::{Address, DigitalSignature};
    use chrono::TimeZone;

    fn sample_transaction() -> Transaction {
        Transaction::with_timestamp(
            100,
            Address::from("genesis"),
            Address::from("godwin"),
            0,
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        )
    }

    #[test]
    fn test_new_block() {
        let block = Block::new("previous_hash".to_string(), sample_transaction());

        assert_eq!(block.previous_hash, "previous_hash");
        assert!(block.nonce <= MAX_SEED_NONCE);
        assert!(!block.is_genesis());
        assert!(Block::new(String::new(), sample_transaction()).is_genesis());
    }

    #[test]
    fn test_hash_is_stable_and_hex() {
        let block = Block::new(String::new(), sample_transaction());

        let hash = block.hash();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, block.hash());
    }

    #[test]
    fn test_hash_follows_field_changes() {
        let mut block = Block::new(String::new(), sample_transaction());
        let original = block.hash();

        block.nonce += 1;
        let after_nonce = block.hash();
        assert_ne!(original, after_nonce);

        block.transaction.amount = 1;
        assert_ne!(after_nonce, block.hash());

        block.transaction.amount = 100;
        block.transaction.signature = Some(DigitalSignature("sig".to_string()));
        assert_ne!(after_nonce, block.hash());
    }

    #[test]
    fn test_canonical_layout() {
        let mut block = Block::with_timestamp(
            "abc".to_string(),
            sample_transaction(),
            Utc.timestamp_millis_opt(1_700_000_000_500).unwrap(),
        );
        block.nonce = 7;

        assert_eq!(
            String::from_utf8(block.canonical_bytes()).unwrap(),
            concat!(
                r#"{"difficulty":0,"nonce":7,"previous_hash":"abc","timestamp":1700000000500,"#,
                r#""transaction":{"amount":100,"fee":0,"payee":"godwin","payer":"genesis","#,
                r#""signature":null,"timestamp":1700000000000}}"#
            )
        );
    }
}
