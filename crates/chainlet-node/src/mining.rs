//! The mining thread and the task that turns mined blocks into proposal rounds.

use crate::constants::MINED_CHANNEL_CAPACITY;
use crate::node::Node;
use chainlet_core::{Block, MiningCancelled};
use std::io;
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct MinerHandle {
    thread: thread::JoinHandle<()>,
    coordinator: tokio::task::JoinHandle<()>,
}

impl MinerHandle {
    /// Waits for both halves to stop. Call after `MiningController::shutdown`.
    pub async fn join(self) {
        let thread = self.thread;
        let _ = tokio::task::spawn_blocking(move || thread.join()).await;
        let _ = self.coordinator.await;
    }
}

/// Starts the miner thread and the coordinator task. Must run inside a tokio
/// runtime.
pub fn start(node: Arc<Node>) -> io::Result<MinerHandle> {
    let (tx, rx) = mpsc::channel(MINED_CHANNEL_CAPACITY);
    let coordinator = tokio::spawn(run_coordinator(node.clone(), rx));
    let thread = thread::Builder::new()
        .name("miner".into())
        .spawn(move || run_miner(&node, &tx))?;
    Ok(MinerHandle {
        thread,
        coordinator,
    })
}

fn run_miner(node: &Node, mined: &mpsc::Sender<Block>) {
    let controller = node.mining();
    let difficulty = node.difficulty();
    info!(difficulty, "miner started");

    while let Some(token) = controller.next_attempt() {
        let (index, previous_hash) = {
            let ledger = node.ledger().read();
            let tip = ledger.tip();
            (tip.index + 1, tip.hash)
        };
        let mut block = Block::new(index, rand::random::<u64>().to_string(), previous_hash);
        debug!(index, "mining attempt started");

        match block.mine(difficulty, &token) {
            Ok(()) => {
                if !controller.claim_success(&token) {
                    continue;
                }
                info!(index, nonce = block.nonce, hash = %block.hash_hex(), "mined block");
                if mined.blocking_send(block).is_err() {
                    debug!("coordinator gone");
                    break;
                }
            }
            Err(MiningCancelled) => {
                controller.finish_attempt(&token);
                debug!(index, "mining attempt cancelled");
            }
        }
    }
    info!("miner stopped");
}

async fn run_coordinator(node: Arc<Node>, mut mined: mpsc::Receiver<Block>) {
    while let Some(block) = mined.recv().await {
        let index = block.index;
        let outcome = node.propose_and_commit(block).await;
        info!(index, ?outcome, "proposal round finished");
    }
}
