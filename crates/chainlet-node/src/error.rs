use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chainlet_core::LedgerError;
use thiserror::Error;

/// A peer RPC that did not produce a usable answer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {peer} failed: {source}")]
    Http {
        peer: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{peer} answered {status}")]
    Status { peer: String, status: StatusCode },
    #[error("could not decode answer from {peer}: {source}")]
    Decode {
        peer: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure to adopt a peer's chain.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Rejections of inbound requests, rendered as status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("malformed body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Decode(_) => StatusCode::BAD_REQUEST,
            ApiError::Ledger(LedgerError::UnknownCandidate(_)) => StatusCode::NOT_FOUND,
            ApiError::Ledger(LedgerError::InvalidProof { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Ledger(_) => StatusCode::CONFLICT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
