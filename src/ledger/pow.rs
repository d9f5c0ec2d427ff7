// Proof of work puzzle

use md5::{Digest, Md5};
use thiserror::Error;

use std::time::{Duration, Instant};

/// Digests are 32 hex characters, so no solution exists beyond this
pub const MAX_DIFFICULTY: u32 = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MiningError {
    #[error("No solution found after {attempts} attempts at difficulty {difficulty}")]
    Exhausted { attempts: u64, difficulty: u32 },

    #[error("Difficulty {0} is above the maximum of 32")]
    DifficultyTooHigh(u32),
}

/// MD5 of the decimal rendering of `value`, as lowercase hex
pub fn puzzle_digest(value: u64) -> String {
    let mut hasher = Md5::new();
    hasher.update(value.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Whether `digest` starts with at least `difficulty` `'0'` characters
pub fn meets_difficulty(digest: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    digest.len() >= difficulty && digest.bytes().take(difficulty).all(|b| b == b'0')
}

/// Whether a mined nonce satisfies `difficulty`
pub fn verify_nonce(nonce: u64, difficulty: u32) -> bool {
    meets_difficulty(&puzzle_digest(nonce), difficulty)
}

/// Outcome of a successful search
#[derive(Debug, Clone)]
pub struct MiningResult {
    /// First offset from the seed that solved the puzzle
    pub solution: u64,
    /// `seed + solution`, the value stored in the block
    pub nonce: u64,
    /// Puzzle digest of `nonce`
    pub digest: String,
    pub attempts: u64,
    pub duration: Duration,
}

impl MiningResult {
    /// Hashes per second
    pub fn hash_rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            self.attempts as f64
        }
    }
}

/// Linear nonce search.
///
/// Tries `seed + 1`, `seed + 2`, ... until the puzzle digest has `difficulty`
/// leading zero hex digits. With `max_attempts` set the search gives up
/// after that many digests instead of running until it succeeds.
#[derive(Debug, Clone, Copy)]
pub struct Miner {
    pub difficulty: u32,
    pub max_attempts: Option<u64>,
}

impl Miner {
    pub fn new(difficulty: u32, max_attempts: Option<u64>) -> Self {
        Self {
            difficulty,
            max_attempts,
        }
    }

    pub fn mine(&self, seed: u64) -> Result<MiningResult, MiningError> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(MiningError::DifficultyTooHigh(self.difficulty));
        }

        let start_time = Instant::now();
        let limit = self.max_attempts.unwrap_or(u64::MAX);
        let mut attempts = 0u64;
        let mut solution = 1u64;

        while attempts < limit {
            let Some(candidate) = seed.checked_add(solution) else {
                break;
            };
            let digest = puzzle_digest(candidate);
            attempts += 1;

            if meets_difficulty(&digest, self.difficulty) {
                return Ok(MiningResult {
                    solution,
                    nonce: candidate,
                    digest,
                    attempts,
                    duration: start_time.elapsed(),
                });
            }

            if attempts % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!(
                    "Mining attempts: {} ({:.1} KH/s)",
                    attempts,
                    attempts as f64 / elapsed.as_secs_f64().max(f64::EPSILON) / 1000.0
                );
            }

            solution += 1;
        }

        Err(MiningError::Exhausted {
            attempts,
            difficulty: self.difficulty,
        })
    }
}
