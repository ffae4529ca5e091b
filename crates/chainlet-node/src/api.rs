use crate::error::ApiError;
use crate::node::Node;
use crate::wire::{Head, Health, PeerAnnouncement, PeerList, ProposalOutcome};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chainlet_core::{Block, ChainSnapshot};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(Health { status: "ok" }) }))
        .route("/receiveBlock/{sender}", post(receive_block))
        .route("/setBlock", post(set_block))
        .route("/chain/head", get(head))
        .route("/chain/{requester}", get(chain))
        .route("/blocks", get(blocks))
        .route("/join/{new_peer}", post(join))
        .route("/addPeer", post(add_peer))
        .route("/peers", get(peers))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

async fn receive_block(
    State(node): State<Arc<Node>>,
    Path(sender): Path<String>,
    body: Bytes,
) -> Result<ProposalOutcome, ApiError> {
    // any proposal, even an unreadable one, stops the current search
    node.mining().preempt();
    let block: Block = match serde_json::from_slice(&body) {
        Ok(block) => block,
        Err(err) => {
            node.release_mining();
            return Err(err.into());
        }
    };
    Ok(node.handle_proposal(&sender, block).await)
}

async fn set_block(State(node): State<Arc<Node>>, body: Bytes) -> Result<StatusCode, ApiError> {
    let block: Block = serde_json::from_slice(&body)?;
    node.handle_commit(block)?;
    Ok(StatusCode::OK)
}

async fn chain(
    State(node): State<Arc<Node>>,
    Path(requester): Path<String>,
) -> Json<ChainSnapshot> {
    Json(node.chain_for(&requester))
}

async fn blocks(State(node): State<Arc<Node>>) -> Json<ChainSnapshot> {
    Json(node.snapshot())
}

async fn head(State(node): State<Arc<Node>>) -> Json<Head> {
    let ledger = node.ledger().read();
    let tip = ledger.tip();
    Json(Head {
        height: tip.index,
        hash: tip.hash_hex(),
    })
}

async fn join(State(node): State<Arc<Node>>, Path(new_peer): Path<String>) -> Json<PeerList> {
    let peers = node.handle_join(&new_peer).await;
    Json(PeerList { peers })
}

async fn add_peer(State(node): State<Arc<Node>>, body: Bytes) -> Result<StatusCode, ApiError> {
    let announcement: PeerAnnouncement = serde_json::from_slice(&body)?;
    node.handle_add_peer(&announcement.peer);
    Ok(StatusCode::OK)
}

async fn peers(State(node): State<Arc<Node>>) -> Json<PeerList> {
    Json(PeerList {
        peers: node.peers().list(),
    })
}
