pub mod chain;
pub mod constants;
pub mod error;
pub mod miner;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub use chain::{BlockSource, ChainSnapshot, Ledger};
pub use error::{LedgerError, LinkError, MiningCancelled};
pub use miner::{CancelToken, MiningController};

pub type Hash = [u8; 32];

pub const ZERO_HASH: Hash = [0u8; 32];

/// A single ledger entry. Field names and digest encoding are the wire format,
/// so every node re-derives the same hash from a decoded block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub timestamp: u64,
    pub data: String,
    #[serde(with = "hex")]
    pub previous_hash: Hash,
    #[serde(with = "hex")]
    pub hash: Hash,
    pub nonce: u64,
}

impl Block {
    /// New unmined block stamped with the current time.
    pub fn new(index: u64, data: impl Into<String>, previous_hash: Hash) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self::with_timestamp(index, timestamp, data, previous_hash)
    }

    pub fn with_timestamp(
        index: u64,
        timestamp: u64,
        data: impl Into<String>,
        previous_hash: Hash,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            data: data.into(),
            previous_hash,
            hash: ZERO_HASH,
            nonce: 0,
        };
        block.hash = block.calculate_hash();
        block
    }

    /// The bytes fed to SHA-256: decimal fields and the lowercase hex previous
    /// hash, concatenated without separators.
    pub fn hash_record(&self) -> String {
        format!(
            "{}{}{}{}{}",
            self.index,
            self.timestamp,
            self.data,
            hex::encode(self.previous_hash),
            self.nonce
        )
    }

    pub fn calculate_hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.hash_record().as_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..]);
        out
    }

    /// Searches nonces until the hash has `difficulty` leading zero bits.
    /// The token is checked once per attempt; on cancellation the nonce
    /// reached so far is kept, so a later call resumes the search.
    pub fn mine(&mut self, difficulty: u32, cancel: &CancelToken) -> Result<(), MiningCancelled> {
        loop {
            if cancel.is_cancelled() {
                return Err(MiningCancelled);
            }
            self.hash = self.calculate_hash();
            if pow::meets_difficulty(&self.hash, difficulty) {
                return Ok(());
            }
            self.nonce = self.nonce.wrapping_add(1);
        }
    }

    /// Recomputes the hash from the stored fields; never trusts `self.hash`.
    pub fn verify(&self, difficulty: u32) -> bool {
        let recomputed = self.calculate_hash();
        recomputed == self.hash && pow::meets_difficulty(&recomputed, difficulty)
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Index: {}, Timestamp: {}, Data: {}, Hash: {}, PrevHash: {}, Nonce: {}",
            self.index,
            self.timestamp,
            self.data,
            hex::encode(self.hash),
            hex::encode(self.previous_hash),
            self.nonce
        )
    }
}

pub mod pow {
    use super::Hash;
    use crate::constants::HASH_BITS;

    pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
        let mut total = 0u32;
        for b in hash {
            if *b == 0 {
                total += 8;
            } else {
                total += b.leading_zeros();
                break;
            }
        }
        total
    }

    /// `hash < 2^(256 - difficulty)` as a big-endian integer, which is the same
    /// as having at least `difficulty` leading zero bits.
    pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
        count_leading_zero_bits(hash) >= difficulty.min(HASH_BITS)
    }
}
