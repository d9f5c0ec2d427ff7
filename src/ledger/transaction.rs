use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use super::crypto::{verify_signature, Address, CryptoError, DigitalSignature, KeyPair};

/// Fee charged when the caller does not pick one
pub const DEFAULT_TRANSACTION_FEE: u64 = 2;

/// Errors that can occur during transaction operations
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Crypto error: {0}")]
    CryptoError(#[from] CryptoError),
}

/// A value transfer from `payer` to `payee`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Transaction {
    /// Amount being transferred
    pub amount: u64,

    /// Sender identity, also the key the signature is checked against
    pub payer: Address,

    /// Recipient identity
    pub payee: Address,

    /// Surcharge deducted from the payer on top of `amount`
    pub fee: u64,

    /// Creation time, millisecond precision
    #[schema(value_type = String, example = "2023-01-01T12:00:00.000Z")]
    pub timestamp: DateTime<Utc>,

    /// Signature over the canonical payload, absent until signed
    pub signature: Option<DigitalSignature>,
}

/// Signable fields in canonical key order.
///
/// Keys are lexicographically ordered and the timestamp is carried as
/// integer milliseconds since the Unix epoch, e.g.
/// `{"amount":50,"fee":2,"payee":"B","payer":"A","timestamp":1700000000000}`.
#[derive(Serialize)]
struct CanonicalPayload<'a> {
    amount: u64,
    fee: u64,
    payee: &'a str,
    payer: &'a str,
    timestamp: i64,
}

impl Transaction {
    /// Creates a new unsigned transaction stamped with the current time.
    ///
    /// No validation happens here; a zero amount is only rejected when the
    /// transaction is submitted to the ledger.
    pub fn new(amount: u64, payer: Address, payee: Address, fee: u64) -> Self {
        Self::with_timestamp(amount, payer, payee, fee, Utc::now())
    }

    /// Creates a new unsigned transaction charging [`DEFAULT_TRANSACTION_FEE`]
    pub fn with_default_fee(amount: u64, payer: Address, payee: Address) -> Self {
        Self::new(amount, payer, payee, DEFAULT_TRANSACTION_FEE)
    }

    pub fn with_timestamp(
        amount: u64,
        payer: Address,
        payee: Address,
        fee: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Transaction {
            amount,
            payer,
            payee,
            fee,
            timestamp: timestamp.trunc_subsecs(3),
            signature: None,
        }
    }

    /// Deterministic encoding of every field except the signature
    pub fn canonical_payload(&self) -> Vec<u8> {
        let payload = CanonicalPayload {
            amount: self.amount,
            fee: self.fee,
            payee: self.payee.as_str(),
            payer: self.payer.as_str(),
            timestamp: self.timestamp.timestamp_millis(),
        };

        // A struct of integers and strings always serializes
        serde_json::to_vec(&payload).unwrap_or_default()
    }

    /// Signs the canonical payload, replacing any previous signature
    pub fn sign(&mut self, key_pair: &KeyPair) {
        let signature = key_pair.sign(&self.canonical_payload());
        self.signature = Some(signature);
    }

    /// Checks the stored signature against `payer`.
    ///
    /// Returns false when unsigned, when the payer is not a public key, or
    /// when the signature does not match the current field values.
    pub fn verify(&self) -> bool {
        self.check_signature().unwrap_or(false)
    }

    fn check_signature(&self) -> Result<bool, TransactionError> {
        let signature = self
            .signature
            .as_ref()
            .ok_or(TransactionError::InvalidSignature)?;
        let public_key = self.payer.to_public_key()?;

        Ok(verify_signature(&self.canonical_payload(), signature, &public_key)?)
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Total debited from the payer, `None` on overflow
    pub fn total_cost(&self) -> Option<u64> {
        self.amount.checked_add(self.fee)
    }
}
