#![allow(dead_code)]

use chainlet_core::{Block, CancelToken};
use chainlet_node::{api::router, Node, NodeConfig};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

/// Low enough that every mine in a test finishes in a few hundred hashes.
pub const D: u32 = 8;

pub async fn spawn_node() -> anyhow::Result<Arc<Node>> {
    spawn_node_with(|config| config).await
}

/// Binds an ephemeral port, builds a non-mining node on it and serves its API.
pub async fn spawn_node_with(
    configure: impl FnOnce(NodeConfig) -> NodeConfig,
) -> anyhow::Result<Arc<Node>> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?.to_string();
    let config = configure(NodeConfig::new(address).with_difficulty(D).with_mining(false));
    let node = Arc::new(Node::new(config)?);
    let app = router(node.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(node)
}

pub fn connect(a: &Node, b: &Node) {
    a.peers().add(b.address());
    b.peers().add(a.address());
}

pub fn mine_after(prev: &Block, data: &str) -> Block {
    mine_after_at(prev, data, D)
}

pub fn mine_after_at(prev: &Block, data: &str, difficulty: u32) -> Block {
    let mut block = Block::new(prev.index + 1, data, prev.hash);
    block
        .mine(difficulty, &CancelToken::new())
        .expect("fresh token is never cancelled");
    block
}

pub fn mine_on_tip(node: &Node, data: &str) -> Block {
    let tip = node.ledger().read().tip().clone();
    mine_after(&tip, data)
}

pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

pub fn url(node: &Node, path: &str) -> String {
    format!("http://{}{}", node.address(), path)
}
