use crate::error::TransportError;
use crate::wire::{PeerAnnouncement, PeerList, ProposalOutcome};
use chainlet_core::{Block, ChainSnapshot};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Outbound side of the peer protocol.
#[derive(Clone, Debug)]
pub struct PeerClient {
    http: Client,
    own_address: String,
}

impl PeerClient {
    pub fn new(own_address: impl Into<String>, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build().map_err(TransportError::Client)?,
            own_address: own_address.into(),
        })
    }

    fn url(peer: &str, path: &str) -> String {
        format!("http://{peer}{path}")
    }

    /// `POST /receiveBlock/{self}`. Transport failures classify as `Unreachable`.
    pub async fn propose(&self, peer: &str, block: &Block) -> ProposalOutcome {
        let url = Self::url(peer, &format!("/receiveBlock/{}", self.own_address));
        match self.http.post(url).json(block).send().await {
            Ok(res) => {
                let outcome = ProposalOutcome::from_status(res.status());
                if outcome == ProposalOutcome::Unreachable {
                    warn!(peer, status = %res.status(), "unexpected answer to proposal");
                }
                debug!(peer, index = block.index, %outcome, "proposal answered");
                outcome
            }
            Err(err) => {
                warn!(peer, error = %err, "could not send block to peer");
                ProposalOutcome::Unreachable
            }
        }
    }

    /// `POST /setBlock`: second phase, tells the peer to commit its candidate.
    pub async fn commit(&self, peer: &str, block: &Block) -> Result<(), TransportError> {
        let res = self
            .send(peer, self.http.post(Self::url(peer, "/setBlock")).json(block))
            .await?;
        Self::expect_success(peer, res).map(|_| ())
    }

    /// `GET /chain/{self}`; the peer registers us as a side effect.
    pub async fn fetch_chain(&self, peer: &str) -> Result<ChainSnapshot, TransportError> {
        let url = Self::url(peer, &format!("/chain/{}", self.own_address));
        let res = self.send(peer, self.http.get(url)).await?;
        Self::decode(peer, Self::expect_success(peer, res)?).await
    }

    /// `POST /join/{self}`; returns the bootstrap's peer list.
    pub async fn join(&self, bootstrap: &str) -> Result<Vec<String>, TransportError> {
        let url = Self::url(bootstrap, &format!("/join/{}", self.own_address));
        let res = self.send(bootstrap, self.http.post(url)).await?;
        let list: PeerList = Self::decode(bootstrap, Self::expect_success(bootstrap, res)?).await?;
        Ok(list.peers)
    }

    /// `POST /addPeer`, telling `peer` about `new_peer`.
    pub async fn announce(&self, peer: &str, new_peer: &str) -> Result<(), TransportError> {
        let body = PeerAnnouncement {
            peer: new_peer.to_string(),
        };
        let res = self
            .send(peer, self.http.post(Self::url(peer, "/addPeer")).json(&body))
            .await?;
        Self::expect_success(peer, res).map(|_| ())
    }

    async fn send(&self, peer: &str, request: reqwest::RequestBuilder) -> Result<Response, TransportError> {
        request.send().await.map_err(|source| TransportError::Http {
            peer: peer.to_string(),
            source,
        })
    }

    fn expect_success(peer: &str, res: Response) -> Result<Response, TransportError> {
        if res.status().is_success() {
            Ok(res)
        } else {
            Err(TransportError::Status {
                peer: peer.to_string(),
                status: res.status(),
            })
        }
    }

    async fn decode<T: DeserializeOwned>(peer: &str, res: Response) -> Result<T, TransportError> {
        res.json().await.map_err(|source| TransportError::Decode {
            peer: peer.to_string(),
            source,
        })
    }
}
