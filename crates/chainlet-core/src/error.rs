use thiserror::Error;

/// Why a block does not extend a given tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LinkError {
    /// The local chain already reaches (or passes) the candidate's index.
    #[error("candidate index {candidate} is behind tip index {tip}")]
    IndexBehind { candidate: u64, tip: u64 },
    /// The candidate sits further ahead than the next index; the caller is behind.
    #[error("candidate index {candidate} is ahead of tip index {tip}")]
    IndexAhead { candidate: u64, tip: u64 },
    #[error("previous hash does not match tip hash")]
    PreviousHashMismatch,
}

/// Returned by `Block::mine` when the attempt was cancelled. Not a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("mining cancelled")]
pub struct MiningCancelled;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("block {index} fails proof-of-work verification")]
    InvalidProof { index: u64 },
    #[error("unknown candidate {0}")]
    UnknownCandidate(String),
    #[error("offered chain of length {offered} is not longer than local length {current}")]
    NotLonger { current: usize, offered: usize },
    #[error("offered chain is invalid")]
    InvalidChain,
}
