use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::account::{Account, AccountError, AccountState};
use super::block::Block;
use super::config::{ConfigError, LedgerConfig};
use super::crypto::Address;
use super::pow::{self, Miner, MiningError, MAX_DIFFICULTY};
use super::transaction::{Transaction, TransactionError};

/// Errors that can occur during ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Transaction rejected: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Account error: {0}")]
    AccountError(#[from] AccountError),

    #[error("Mining failed: {0}")]
    MiningError(#[from] MiningError),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Invalid chain: {0}")]
    InvalidChain(String),
}

impl LedgerError {
    /// Whether the error is a rejection of the submitted transaction
    pub fn is_rejection(&self) -> bool {
        matches!(self, LedgerError::TransactionError(_))
    }
}

/// A block appended by a successful mining run
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MinedBlock {
    /// Position of the block in the chain
    pub index: u64,
    /// Offset from the block's seed nonce that solved the puzzle
    pub solution: u64,
    pub attempts: u64,
    pub hash: String,
    pub block: Block,
}

/// Result of asking the ledger to mine
#[derive(Debug, Clone)]
pub enum MiningOutcome {
    Mined(MinedBlock),
    /// The pending queue was empty; nothing changed
    NothingToMine,
}

impl MiningOutcome {
    pub fn mined(&self) -> Option<&MinedBlock> {
        match self {
            MiningOutcome::Mined(mined) => Some(mined),
            MiningOutcome::NothingToMine => None,
        }
    }
}

/// A consistent copy of the chain
#[derive(Debug, Clone)]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub difficulty: u32,
}

impl ChainSnapshot {
    pub fn validate(&self) -> Result<(), LedgerError> {
        validate_blocks(&self.chain)
    }
}

/// Time source for difficulty adjustment
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Instant;
}

/// The monotonic system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug)]
struct ChainState {
    chain: Vec<Block>,
    pending: VecDeque<Transaction>,
    difficulty: u32,
    last_adjustment: Instant,
    blocks_at_last_adjustment: usize,
}

/// The authoritative in-memory ledger.
///
/// Cloning yields another handle to the same ledger. Submission and mining
/// each run under one lock covering the chain, the pending queue and the
/// difficulty, so a balance change and the block sealing it are never
/// interleaved with another writer.
#[derive(Debug, Clone)]
pub struct Ledger {
    state: Arc<Mutex<ChainState>>,
    account_state: AccountState,
    config: Arc<LedgerConfig>,
    clock: Arc<dyn Clock>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Creates a ledger with default parameters
    pub fn new() -> Self {
        Self::build(LedgerConfig::default(), Arc::new(SystemClock))
    }

    /// Creates a ledger after validating `config`
    pub fn with_config(config: LedgerConfig) -> Result<Self, LedgerError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a ledger whose difficulty adjustment reads time from `clock`
    pub fn with_clock(config: LedgerConfig, clock: Arc<dyn Clock>) -> Result<Self, LedgerError> {
        config.validate()?;
        Ok(Self::build(config, clock))
    }

    fn build(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        let account_state = AccountState::new();

        let genesis_payee = Address(config.genesis_payee.clone());
        let genesis_block = Block::new(
            String::new(),
            Transaction::new(
                config.genesis_allocation,
                Address(config.genesis_payer.clone()),
                genesis_payee.clone(),
                0,
            ),
        );

        if let Err(err) = account_state.deposit(&genesis_payee, config.genesis_allocation) {
            warn!("Failed to seed genesis allocation: {}", err);
        }

        info!(
            "Created genesis block {} allocating {} to {}",
            genesis_block.hash(),
            config.genesis_allocation,
            genesis_payee
        );

        let state = ChainState {
            chain: vec![genesis_block],
            pending: VecDeque::new(),
            difficulty: config.difficulty,
            last_adjustment: clock.now(),
            blocks_at_last_adjustment: 1,
        };

        Ledger {
            state: Arc::new(Mutex::new(state)),
            account_state,
            config: Arc::new(config),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Required leading zero hex digits for the next block
    pub fn difficulty(&self) -> u32 {
        self.lock().difficulty
    }

    pub fn get_last_block(&self) -> Block {
        let state = self.lock();
        // The chain always holds at least the genesis block
        state.chain[state.chain.len() - 1].clone()
    }

    /// The whole chain, genesis first
    pub fn get_chain(&self) -> Vec<Block> {
        self.lock().chain.clone()
    }

    /// The chain and the difficulty for the next block, read under one lock
    pub fn snapshot(&self) -> ChainSnapshot {
        let state = self.lock();
        ChainSnapshot {
            chain: state.chain.clone(),
            difficulty: state.difficulty,
        }
    }

    /// Number of blocks, genesis included
    pub fn chain_len(&self) -> usize {
        self.lock().chain.len()
    }

    /// Accepted transactions not yet sealed, oldest first
    pub fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.lock().pending.iter().cloned().collect()
    }

    /// Balance of `address`, zero when unknown
    pub fn get_balance(&self, address: &Address) -> u64 {
        self.account_state.balance(address)
    }

    pub fn get_all_accounts(&self) -> Vec<Account> {
        self.account_state.get_all_accounts()
    }

    /// Sum of every balance in the table
    pub fn total_supply(&self) -> u128 {
        self.account_state.total_supply()
    }

    /// Bootstrap credit with no matching debit, used for new wallets
    pub fn grant(&self, address: &Address, amount: u64) -> Result<u64, LedgerError> {
        let _state = self.lock();
        let balance = self.account_state.deposit(address, amount)?;
        info!("Granted {} to {}", amount, address);
        Ok(balance)
    }

    /// Validates and accepts a signed transaction.
    ///
    /// Balances move immediately: the payer is debited `amount + fee` and the
    /// payee credited `amount`, then the transaction joins the pending queue.
    /// Returns the index of the block expected to seal it.
    pub fn submit_transaction(&self, transaction: Transaction) -> Result<u64, LedgerError> {
        let mut state = self.lock();
        self.submit_locked(&mut state, transaction)
    }

    /// Seals the oldest pending transaction into a new block mined by `miner`.
    ///
    /// Later pending transactions stay queued for the following blocks.
    pub fn mine_next_block(&self, miner: &Address) -> Result<MiningOutcome, LedgerError> {
        let mut state = self.lock();
        self.mine_locked(&mut state, miner)
    }

    /// Submits `transaction` and mines until the block sealing it is appended,
    /// without releasing the lock.
    ///
    /// Transactions already queued ahead of it are sealed first, each in its
    /// own block credited to `miner`. Returns every block mined in order; the
    /// last one carries `transaction`. If mining gives up part way, blocks
    /// already appended stay and `transaction` remains pending.
    pub fn submit_and_mine(
        &self,
        transaction: Transaction,
        miner: &Address,
    ) -> Result<Vec<MinedBlock>, LedgerError> {
        let mut state = self.lock();
        let block_index = self.submit_locked(&mut state, transaction)?;

        let mut sealed = Vec::new();
        loop {
            match self.mine_locked(&mut state, miner)? {
                MiningOutcome::Mined(mined) => {
                    let done = mined.index >= block_index;
                    sealed.push(mined);
                    if done {
                        return Ok(sealed);
                    }
                    debug!(
                        "Sealed an earlier pending transaction, continuing to block {}",
                        block_index
                    );
                }
                MiningOutcome::NothingToMine => {
                    return Err(LedgerError::InvalidChain(
                        "accepted transaction vanished from the pending queue".to_string(),
                    ))
                }
            }
        }
    }

    fn submit_locked(
        &self,
        state: &mut ChainState,
        transaction: Transaction,
    ) -> Result<u64, LedgerError> {
        info!("Processing transaction of {} from {}", transaction.amount, transaction.payer);

        if !transaction.verify() {
            warn!("Rejected transaction from {}: invalid signature", transaction.payer);
            return Err(TransactionError::InvalidSignature.into());
        }

        if transaction.amount == 0 {
            warn!("Rejected transaction from {}: zero amount", transaction.payer);
            return Err(TransactionError::InvalidAmount("amount must be positive".to_string()).into());
        }

        let required = transaction.total_cost().ok_or_else(|| {
            TransactionError::InvalidAmount("amount plus fee overflows".to_string())
        })?;
        let available = self.account_state.balance(&transaction.payer);
        if available < required {
            warn!(
                "Rejected transaction from {}: insufficient balance ({} < {})",
                transaction.payer, available, required
            );
            return Err(TransactionError::InsufficientBalance { required, available }.into());
        }

        self.account_state.transfer(
            &transaction.payer,
            &transaction.payee,
            transaction.amount,
            transaction.fee,
        )?;

        state.pending.push_back(transaction);
        info!("Transaction accepted, {} pending", state.pending.len());

        Ok((state.chain.len() + state.pending.len() - 1) as u64)
    }

    fn mine_locked(
        &self,
        state: &mut ChainState,
        miner: &Address,
    ) -> Result<MiningOutcome, LedgerError> {
        let Some(transaction) = state.pending.front() else {
            info!("No pending transactions to mine");
            return Ok(MiningOutcome::NothingToMine);
        };

        let previous_hash = state.chain[state.chain.len() - 1].hash();
        let mut block = Block::new(previous_hash, transaction.clone());
        block.difficulty = state.difficulty;

        let mut credit = self.config.mining_reward;
        if self.config.credit_fees_to_miner {
            credit = credit
                .checked_add(transaction.fee)
                .ok_or_else(|| AccountError::Overflow(miner.clone()))?;
        }

        info!("Mining transaction at difficulty {}...", block.difficulty);
        let result = Miner::new(block.difficulty, self.config.max_mining_attempts).mine(block.nonce)?;
        block.nonce = result.nonce;

        self.account_state.deposit(miner, credit)?;
        state.pending.pop_front();

        let hash = block.hash();
        state.chain.push(block.clone());
        let index = (state.chain.len() - 1) as u64;

        info!(
            "Solved block {} with solution {} after {} attempts ({:.0} H/s)",
            index,
            result.solution,
            result.attempts,
            result.hash_rate()
        );

        let now = self.clock.now();
        self.adjust_locked(state, now);

        Ok(MiningOutcome::Mined(MinedBlock {
            index,
            solution: result.solution,
            attempts: result.attempts,
            hash,
            block,
        }))
    }

    /// Re-evaluates difficulty against the ledger clock; returns the difficulty
    pub fn adjust_difficulty(&self) -> u32 {
        self.adjust_difficulty_at(self.clock.now())
    }

    /// Re-evaluates difficulty as if the current time were `now`.
    ///
    /// Only acts when the chain length is a multiple of the adjustment
    /// interval and blocks were added since the previous check. Raises the
    /// difficulty by one when the average time per block exceeds the target.
    /// Difficulty never decreases.
    pub fn adjust_difficulty_at(&self, now: Instant) -> u32 {
        let mut state = self.lock();
        self.adjust_locked(&mut state, now)
    }

    fn adjust_locked(&self, state: &mut ChainState, now: Instant) -> u32 {
        let length = state.chain.len();
        if length as u64 % self.config.adjustment_interval != 0 {
            return state.difficulty;
        }

        let blocks = length.saturating_sub(state.blocks_at_last_adjustment);
        if blocks == 0 {
            return state.difficulty;
        }

        let elapsed = now.saturating_duration_since(state.last_adjustment);
        let average = elapsed.as_secs_f64() / blocks as f64;
        let ceiling = self.config.max_difficulty.unwrap_or(MAX_DIFFICULTY);

        debug!(
            "Difficulty check: {} blocks in {:.2}s ({:.2}s per block)",
            blocks,
            elapsed.as_secs_f64(),
            average
        );

        if average > self.config.target_block_time_secs as f64 && state.difficulty < ceiling {
            state.difficulty += 1;
            info!("Difficulty raised to {}", state.difficulty);
        }

        state.last_adjustment = now;
        state.blocks_at_last_adjustment = length;
        state.difficulty
    }

    /// Checks linkage, proof of work and signatures of every block after genesis
    pub fn validate(&self) -> Result<(), LedgerError> {
        validate_blocks(&self.lock().chain)
    }

    pub fn is_valid(&self) -> bool {
        match self.validate() {
            Ok(()) => true,
            Err(err) => {
                warn!("{}", err);
                false
            }
        }
    }

    #[cfg(test)]
    fn with_chain_mut<R>(&self, f: impl FnOnce(&mut Vec<Block>) -> R) -> R {
        f(&mut self.lock().chain)
    }
}

/// Validates a sequence of blocks, genesis first
pub fn validate_blocks(chain: &[Block]) -> Result<(), LedgerError> {
    let Some(genesis) = chain.first() else {
        return Err(LedgerError::InvalidChain("chain is empty".to_string()));
    };
    if !genesis.is_genesis() {
        return Err(LedgerError::InvalidChain(
            "genesis block links to a predecessor".to_string(),
        ));
    }

    for (index, pair) in chain.windows(2).enumerate() {
        let (previous, current) = (&pair[0], &pair[1]);
        let index = index + 1;

        if current.previous_hash != previous.hash() {
            return Err(LedgerError::InvalidChain(format!(
                "block {} does not link to block {}",
                index,
                index - 1
            )));
        }

        if !pow::verify_nonce(current.nonce, current.difficulty) {
            return Err(LedgerError::InvalidChain(format!(
                "block {} has an invalid proof of work",
                index
            )));
        }

        if !current.transaction.verify() {
            return Err(LedgerError::InvalidChain(format!(
                "block {} carries an invalid signature",
                index
            )));
        }
    }

    Ok(())
}
