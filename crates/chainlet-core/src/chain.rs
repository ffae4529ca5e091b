use crate::constants::{GENESIS_DATA, GENESIS_TIMESTAMP};
use crate::error::{LedgerError, LinkError};
use crate::{Block, CancelToken, Hash, ZERO_HASH};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Which code path committed a block. Logged only; never affects validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockSource {
    Mined,
    Peer,
    Replaced,
}

/// Wire shape of a full chain: `{"blocks": [...]}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub blocks: Vec<Block>,
}

/// Committed blocks plus the pool of proposed, uncommitted candidates.
#[derive(Debug)]
pub struct Ledger {
    blocks: Vec<Block>,
    candidates: HashMap<Hash, Block>,
    difficulty: u32,
}

impl Ledger {
    pub fn new(difficulty: u32) -> Self {
        Self {
            blocks: vec![genesis_block(difficulty)],
            candidates: HashMap::new(),
            difficulty,
        }
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("ledger always holds genesis")
    }

    pub fn height(&self) -> u64 {
        self.tip().index
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            blocks: self.blocks.clone(),
        }
    }

    /// Whether `candidate` is the block directly after `tip`.
    pub fn validate_link(candidate: &Block, tip: &Block) -> Result<(), LinkError> {
        let expected = tip.index + 1;
        if candidate.index < expected {
            return Err(LinkError::IndexBehind {
                candidate: candidate.index,
                tip: tip.index,
            });
        }
        if candidate.index > expected {
            return Err(LinkError::IndexAhead {
                candidate: candidate.index,
                tip: tip.index,
            });
        }
        if candidate.previous_hash != tip.hash {
            return Err(LinkError::PreviousHashMismatch);
        }
        Ok(())
    }

    /// Appends without checks; callers establish validity first.
    pub fn commit(&mut self, block: Block, source: BlockSource) {
        self.candidates.remove(&block.hash);
        info!(
            index = block.index,
            hash = %block.hash_hex(),
            ?source,
            "block committed"
        );
        self.blocks.push(block);
    }

    /// Verifies the proof and the link to the current tip, then commits.
    pub fn try_commit(&mut self, block: Block, source: BlockSource) -> Result<(), LedgerError> {
        if !block.verify(self.difficulty) {
            return Err(LedgerError::InvalidProof { index: block.index });
        }
        Self::validate_link(&block, self.tip())?;
        self.commit(block, source);
        Ok(())
    }

    /// Genesis shape, proof of every block and every adjacent link.
    pub fn is_chain_valid(blocks: &[Block], difficulty: u32) -> bool {
        let Some(first) = blocks.first() else {
            return false;
        };
        if first.index != 0 || first.previous_hash != ZERO_HASH {
            return false;
        }
        if !blocks.par_iter().all(|b| b.verify(difficulty)) {
            return false;
        }
        blocks
            .windows(2)
            .all(|pair| Self::validate_link(&pair[1], &pair[0]).is_ok())
    }

    /// Longest valid chain wins; equal length keeps the incumbent.
    pub fn replace(&mut self, new_blocks: Vec<Block>) -> Result<(), LedgerError> {
        if new_blocks.len() <= self.blocks.len() {
            return Err(LedgerError::NotLonger {
                current: self.blocks.len(),
                offered: new_blocks.len(),
            });
        }
        if !Self::is_chain_valid(&new_blocks, self.difficulty) {
            return Err(LedgerError::InvalidChain);
        }
        info!(
            from = self.blocks.len(),
            to = new_blocks.len(),
            source = ?BlockSource::Replaced,
            "chain replaced"
        );
        for block in &new_blocks {
            self.candidates.remove(&block.hash);
        }
        self.blocks = new_blocks;
        Ok(())
    }

    /// Returns `true` if the block was not already pooled.
    pub fn add_candidate(&mut self, block: Block) -> bool {
        debug!(index = block.index, hash = %block.hash_hex(), "candidate pooled");
        self.candidates.insert(block.hash, block).is_none()
    }

    pub fn find_candidate(&self, hash: &Hash) -> Option<Block> {
        self.candidates.get(hash).cloned()
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Drops candidates at or below `index`. Not called automatically.
    pub fn prune_candidates(&mut self, index: u64) -> usize {
        let before = self.candidates.len();
        self.candidates.retain(|_, b| b.index > index);
        before - self.candidates.len()
    }
}

/// The shared first block: fixed timestamp and payload, mined at `difficulty`.
/// Deterministic, so nodes with the same difficulty agree on it.
pub fn genesis_block(difficulty: u32) -> Block {
    let mut genesis = Block::with_timestamp(0, GENESIS_TIMESTAMP, GENESIS_DATA, ZERO_HASH);
    genesis
        .mine(difficulty, &CancelToken::new())
        .expect("fresh token is never cancelled");
    genesis
}
