//! The gossip coordinator: two-phase block propagation, chain sync and peer
//! discovery around one ledger.
//!
//! Locks on the ledger are only ever taken inside short synchronous scopes and
//! are released before any network call.

use crate::client::PeerClient;
use crate::config::NodeConfig;
use crate::error::{ApiError, SyncError, TransportError};
use crate::peers::PeerRegistry;
use crate::wire::ProposalOutcome;
use chainlet_core::{
    Block, BlockSource, ChainSnapshot, Ledger, LedgerError, LinkError, MiningController,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a local proposal round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Every reachable peer accepted and the block is our new tip.
    Committed,
    /// A peer had a longer chain; we synced to it and dropped the block.
    Superseded,
    /// A peer refused the block outright; nothing was committed.
    Rejected,
    /// Peers accepted, but our own tip moved while the round ran, or we had
    /// already accepted a peer's block at the same index.
    Stale,
}

pub struct Node {
    config: NodeConfig,
    ledger: RwLock<Ledger>,
    peers: PeerRegistry,
    mining: MiningController,
    client: PeerClient,
    proposing: AtomicBool,
    /// Index of a peer block we answered `Accepted` for and have not yet seen
    /// committed. Mining stays off and our own rounds at that index stand down
    /// while it is set.
    awaiting_commit: Mutex<Option<u64>>,
}

impl Node {
    pub fn new(config: NodeConfig) -> Result<Self, TransportError> {
        let client = PeerClient::new(config.address.clone(), config.rpc_timeout)?;
        Ok(Self {
            ledger: RwLock::new(Ledger::new(config.difficulty)),
            peers: PeerRegistry::new(config.address.clone()),
            mining: MiningController::new(true),
            client,
            proposing: AtomicBool::new(false),
            awaiting_commit: Mutex::new(None),
            config,
        })
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn difficulty(&self) -> u32 {
        self.config.difficulty
    }

    pub fn ledger(&self) -> &RwLock<Ledger> {
        &self.ledger
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    pub fn mining(&self) -> &MiningController {
        &self.mining
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        self.ledger.read().snapshot()
    }

    pub fn is_proposing(&self) -> bool {
        self.proposing.load(Ordering::Acquire)
    }

    pub fn awaiting_commit(&self) -> Option<u64> {
        *self.awaiting_commit.lock()
    }

    /// Resumes mining unless a round of ours is in flight or a peer block we
    /// accepted is still waiting for its commit. Returns whether it resumed.
    pub fn release_mining(&self) -> bool {
        let awaiting = self.awaiting_commit.lock();
        if self.is_proposing() || awaiting.is_some() {
            debug!(awaiting = ?*awaiting, "mining stays paused");
            return false;
        }
        self.mining.resume();
        true
    }

    fn stands_down_for(&self, index: u64) -> bool {
        self.awaiting_commit
            .lock()
            .is_some_and(|pending| pending <= index)
    }

    /// Runs propose -> commit for a block this node mined, then releases the
    /// miner.
    pub async fn propose_and_commit(&self, block: Block) -> RoundOutcome {
        self.mining.pause();
        self.proposing.store(true, Ordering::Release);
        let outcome = self.run_round(block).await;
        self.proposing.store(false, Ordering::Release);
        self.release_mining();
        outcome
    }

    async fn run_round(&self, block: Block) -> RoundOutcome {
        self.ledger.write().add_candidate(block.clone());

        let peers = self.peers.list();
        let mut answers = Vec::with_capacity(peers.len());
        for peer in peers {
            let outcome = self.client.propose(&peer, &block).await;
            answers.push((peer, outcome));
        }

        if let Some((peer, _)) = answers
            .iter()
            .find(|(_, o)| *o == ProposalOutcome::RejectedIndexBehind)
        {
            info!(peer = %peer, index = block.index, "peer has a longer chain, dropping candidate");
            if let Err(err) = self.request_chain(peer).await {
                warn!(peer = %peer, error = %err, "sync after rejected proposal failed");
            }
            return RoundOutcome::Superseded;
        }

        if let Some((peer, outcome)) = answers.iter().find(|(_, o)| {
            matches!(
                o,
                ProposalOutcome::RejectedPreviousHash | ProposalOutcome::Malformed
            )
        }) {
            warn!(peer = %peer, index = block.index, %outcome, "proposal refused, candidate abandoned");
            return RoundOutcome::Rejected;
        }

        if self.stands_down_for(block.index) {
            info!(index = block.index, "accepted a peer block at this index, abandoning own");
            return RoundOutcome::Stale;
        }

        info!(index = block.index, "proposal accepted, sending commit to peers");
        for (peer, _) in answers
            .iter()
            .filter(|(_, o)| *o == ProposalOutcome::Accepted)
        {
            if let Err(err) = self.client.commit(peer, &block).await {
                warn!(peer = %peer, error = %err, "commit instruction failed");
            }
        }

        if self.stands_down_for(block.index) {
            info!(index = block.index, "accepted a peer block during commit, keeping theirs");
            return RoundOutcome::Stale;
        }
        match self.ledger.write().try_commit(block, BlockSource::Mined) {
            Ok(()) => RoundOutcome::Committed,
            Err(err) => {
                warn!(error = %err, "local commit failed, tip moved during round");
                RoundOutcome::Stale
            }
        }
    }

    /// Server side of a proposal from `sender`.
    pub async fn handle_proposal(self: &Arc<Self>, sender: &str, block: Block) -> ProposalOutcome {
        self.mining.preempt();
        self.peers.add(sender);
        info!(sender, block = %block, "received block");

        if !block.verify(self.difficulty()) {
            warn!(sender, index = block.index, "proposed block fails proof-of-work");
            self.release_mining();
            return ProposalOutcome::Malformed;
        }

        let link = {
            let mut ledger = self.ledger.write();
            ledger.add_candidate(block.clone());
            Ledger::validate_link(&block, ledger.tip())
        };

        let outcome = match link {
            Ok(()) => ProposalOutcome::Accepted,
            Err(LinkError::IndexBehind { .. }) => ProposalOutcome::RejectedIndexBehind,
            Err(LinkError::IndexAhead { .. }) => self.catch_up(sender, &block).await,
            Err(LinkError::PreviousHashMismatch) => self.adopt_fork(sender, &block).await,
        };

        if outcome == ProposalOutcome::Accepted {
            {
                let mut awaiting = self.awaiting_commit.lock();
                *awaiting = Some(awaiting.map_or(block.index, |i| i.max(block.index)));
            }
            self.spawn_commit_watchdog(block.index);
        } else {
            self.release_mining();
        }
        outcome
    }

    /// We are behind the sender: pull its chain, then re-check the block.
    /// A sender chain that only ties ours is settled like a fork.
    async fn catch_up(&self, sender: &str, block: &Block) -> ProposalOutcome {
        if let Err(err) = self.request_chain(sender).await {
            debug!(sender, error = %err, "could not catch up with proposer");
        }
        let link = Ledger::validate_link(block, self.ledger.read().tip());
        match link {
            Ok(()) => ProposalOutcome::Accepted,
            Err(LinkError::IndexBehind { .. }) => ProposalOutcome::RejectedIndexBehind,
            Err(LinkError::PreviousHashMismatch) => self.adopt_fork(sender, block).await,
            Err(LinkError::IndexAhead { .. }) => ProposalOutcome::RejectedPreviousHash,
        }
    }

    /// Same height, different history. The sender's chain plus its block is
    /// one longer than ours, so adopting it breaks the tie.
    async fn adopt_fork(&self, sender: &str, block: &Block) -> ProposalOutcome {
        let mut blocks = match self.client.fetch_chain(sender).await {
            Ok(snapshot) => snapshot.blocks,
            Err(err) => {
                warn!(sender, error = %err, "could not fetch competing chain");
                return ProposalOutcome::RejectedPreviousHash;
            }
        };
        blocks.push(block.clone());
        let replaced = self.ledger.write().replace(blocks);
        match replaced {
            Ok(()) => {
                info!(sender, index = block.index, "adopted competing chain");
                ProposalOutcome::Accepted
            }
            Err(err) => {
                debug!(sender, error = %err, "competing chain not adopted");
                ProposalOutcome::RejectedPreviousHash
            }
        }
    }

    /// Closes the wait on an accepted block if its commit never arrives. A
    /// later acceptance owns the wait and gets its own watchdog.
    fn spawn_commit_watchdog(self: &Arc<Self>, index: u64) {
        let node = Arc::clone(self);
        let timeout = self.config.commit_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            {
                let mut awaiting = node.awaiting_commit.lock();
                if *awaiting != Some(index) {
                    return;
                }
                *awaiting = None;
            }
            if node.ledger.read().height() < index {
                info!(index, "no commit arrived, giving up on accepted block");
            }
            node.release_mining();
        });
    }

    /// Server side of `/setBlock`.
    pub fn handle_commit(&self, block: Block) -> Result<(), ApiError> {
        let result = {
            let mut ledger = self.ledger.write();
            if ledger.tip().hash == block.hash {
                debug!(index = block.index, "block already at tip");
                Ok(())
            } else {
                match ledger.find_candidate(&block.hash) {
                    Some(candidate) => ledger.try_commit(candidate, BlockSource::Peer),
                    None => Err(LedgerError::UnknownCandidate(block.hash_hex())),
                }
            }
        };
        {
            let mut awaiting = self.awaiting_commit.lock();
            if awaiting.is_some_and(|pending| pending <= block.index) {
                *awaiting = None;
            }
        }
        self.release_mining();
        if let Err(err) = &result {
            warn!(index = block.index, error = %err, "commit refused");
        }
        result.map_err(ApiError::from)
    }

    /// Fetches `peer`'s chain and adopts it if longer and valid.
    pub async fn request_chain(&self, peer: &str) -> Result<(), SyncError> {
        let snapshot = self.client.fetch_chain(peer).await?;
        let offered = snapshot.blocks.len();
        let replaced = self.ledger.write().replace(snapshot.blocks);
        match replaced {
            Ok(()) => {
                info!(peer, length = offered, "chain replaced with chain from peer");
                Ok(())
            }
            Err(err) => {
                debug!(peer, error = %err, "kept local chain");
                Err(err.into())
            }
        }
    }

    /// Server side of `/chain/{requester}`.
    pub fn chain_for(&self, requester: &str) -> ChainSnapshot {
        self.peers.add(requester);
        self.snapshot()
    }

    /// Announces this node to `bootstrap`, learns its peers and syncs to its chain.
    pub async fn join_network(&self, bootstrap: &str) -> Result<usize, TransportError> {
        let peers = self.client.join(bootstrap).await?;
        self.peers.add(bootstrap);
        for peer in &peers {
            self.peers.add(peer);
        }
        info!(peers = ?self.peers.list(), "joined network");
        if let Err(err) = self.request_chain(bootstrap).await {
            debug!(bootstrap, error = %err, "initial sync kept local chain");
        }
        Ok(self.peers.len())
    }

    /// Server side of `/join/{new_peer}`: flood the newcomer to everyone we
    /// know, register it, and hand back our previous peer list.
    pub async fn handle_join(&self, new_peer: &str) -> Vec<String> {
        let known: Vec<String> = self
            .peers
            .list()
            .into_iter()
            .filter(|p| p != new_peer)
            .collect();
        for peer in &known {
            if let Err(err) = self.client.announce(peer, new_peer).await {
                warn!(peer = %peer, error = %err, "could not notify peer of newcomer");
            }
        }
        self.peers.add(new_peer);
        known
    }

    pub fn handle_add_peer(&self, peer: &str) -> bool {
        self.peers.add(peer)
    }
}
