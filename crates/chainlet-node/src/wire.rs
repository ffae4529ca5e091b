//! JSON bodies exchanged between nodes, besides `Block` and `ChainSnapshot`.

use axum::{http::StatusCode, response::IntoResponse, response::Response};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a peer answered a block proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalOutcome {
    Accepted,
    /// Same index as the peer's next block, but built on a different tip.
    RejectedPreviousHash,
    /// The peer's chain is already at least as long; fetch it.
    RejectedIndexBehind,
    /// Body did not decode or the block failed proof-of-work verification.
    Malformed,
    Unreachable,
}

impl ProposalOutcome {
    pub fn status(self) -> StatusCode {
        match self {
            ProposalOutcome::Accepted => StatusCode::OK,
            ProposalOutcome::RejectedPreviousHash => StatusCode::NOT_ACCEPTABLE,
            ProposalOutcome::RejectedIndexBehind => StatusCode::CONFLICT,
            ProposalOutcome::Malformed => StatusCode::BAD_REQUEST,
            ProposalOutcome::Unreachable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::OK => ProposalOutcome::Accepted,
            StatusCode::NOT_ACCEPTABLE => ProposalOutcome::RejectedPreviousHash,
            StatusCode::CONFLICT => ProposalOutcome::RejectedIndexBehind,
            StatusCode::BAD_REQUEST => ProposalOutcome::Malformed,
            _ => ProposalOutcome::Unreachable,
        }
    }
}

impl fmt::Display for ProposalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ProposalOutcome::Accepted => "accepted",
            ProposalOutcome::RejectedPreviousHash => "invalid previous hash",
            ProposalOutcome::RejectedIndexBehind => "my chain is longer",
            ProposalOutcome::Malformed => "malformed block",
            ProposalOutcome::Unreachable => "unreachable",
        };
        f.write_str(text)
    }
}

impl IntoResponse for ProposalOutcome {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerList {
    pub peers: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAnnouncement {
    pub peer: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Head {
    pub height: u64,
    pub hash: String,
}

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
}
