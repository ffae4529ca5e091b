mod helpers;

use chainlet_core::{BlockSource, Ledger, LedgerError, LinkError};
use chainlet_node::{error::ApiError, mining, NodeConfig, ProposalOutcome, RoundOutcome};
use helpers::*;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn proposal_is_accepted_and_committed_on_both_nodes() -> anyhow::Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;
    connect(&a, &b);

    // b is in the middle of its own search when a's block arrives
    let b_attempt = b.mining().next_attempt().expect("b is allowed to mine");

    let block = mine_on_tip(&a, "from a");
    assert_eq!(a.propose_and_commit(block.clone()).await, RoundOutcome::Committed);

    assert!(b_attempt.is_cancelled());
    assert_eq!(a.ledger().read().tip(), &block);
    assert_eq!(b.ledger().read().tip(), &block);
    assert_eq!(b.ledger().read().candidate_count(), 0);

    // both miners are free again and will build on index 2
    assert!(!a.mining().is_paused());
    assert!(!b.mining().is_paused());
    assert_eq!(b.ledger().read().height() + 1, 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn running_miner_is_preempted_and_chain_continues() -> anyhow::Result<()> {
    // slow enough that b is still searching when a's block lands
    const SLOW: u32 = 18;
    let slow = |c: NodeConfig| {
        c.with_difficulty(SLOW)
            .with_commit_timeout(Duration::from_millis(500))
    };
    let a = spawn_node_with(slow).await?;
    let b = spawn_node_with(slow).await?;
    connect(&a, &b);

    let genesis = a.ledger().read().tip().clone();
    let a1 = mine_after_at(&genesis, "a1", SLOW);

    let miner = mining::start(b.clone())?;
    let deadline = Instant::now() + Duration::from_secs(5);
    while !b.mining().is_mining() && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(b.mining().is_mining(), "miner never started an attempt");

    let outcome = a.propose_and_commit(a1.clone()).await;
    if outcome == RoundOutcome::Committed {
        assert_eq!(b.ledger().read().blocks()[1], a1);
    }

    // b keeps mining on top of whatever index 1 became and a follows
    let converged = wait_until(Duration::from_secs(60), || {
        b.ledger().read().height() >= 2 && a.snapshot() == b.snapshot()
    })
    .await;
    b.mining().shutdown();
    miner.join().await;

    assert!(converged, "nodes did not agree on a chain past index 2");
    assert!(Ledger::is_chain_valid(&b.snapshot().blocks, SLOW));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn own_round_stands_down_for_accepted_peer_block() -> anyhow::Result<()> {
    let b = spawn_node().await?;
    let genesis = b.ledger().read().tip().clone();
    let theirs = mine_after(&genesis, "theirs");
    let ours = mine_after(&genesis, "ours");

    assert_eq!(
        b.handle_proposal("127.0.0.1:9", theirs.clone()).await,
        ProposalOutcome::Accepted
    );
    assert_eq!(b.awaiting_commit(), Some(1));

    assert_eq!(b.propose_and_commit(ours).await, RoundOutcome::Stale);
    assert_eq!(b.ledger().read().len(), 1);
    assert!(b.mining().is_paused());

    b.handle_commit(theirs.clone())?;
    assert_eq!(b.ledger().read().tip(), &theirs);
    assert_eq!(b.awaiting_commit(), None);
    assert!(!b.mining().is_paused());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn refused_proposal_keeps_miner_paused_during_own_round() -> anyhow::Result<()> {
    let a = spawn_node_with(|c| c.with_rpc_timeout(Duration::from_secs(2))).await?;

    // accepts connections, never answers
    let silent = TcpListener::bind("127.0.0.1:0").await?;
    let silent_addr = silent.local_addr()?.to_string();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = silent.accept().await {
            held.push(socket);
        }
    });
    a.peers().add(&silent_addr);

    let genesis = a.ledger().read().tip().clone();
    let a1 = mine_after(&genesis, "a1");
    a.ledger().write().try_commit(a1, BlockSource::Mined)?;
    let a2 = mine_on_tip(&a, "a2");

    let round = tokio::spawn({
        let a = a.clone();
        async move { a.propose_and_commit(a2).await }
    });
    assert!(wait_until(Duration::from_secs(1), || a.is_proposing()).await);
    assert!(a.mining().is_paused());

    let late = mine_after(&genesis, "late");
    assert_eq!(
        a.handle_proposal("127.0.0.1:9", late).await,
        ProposalOutcome::RejectedIndexBehind
    );
    assert!(a.mining().is_paused());
    assert!(!round.is_finished());

    assert_eq!(round.await?, RoundOutcome::Committed);
    assert!(!a.mining().is_paused());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn competing_blocks_converge_after_third_block() -> anyhow::Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;
    connect(&a, &b);

    let a1 = mine_on_tip(&a, "a1");
    let b1 = mine_on_tip(&b, "b1");
    a.ledger().write().try_commit(a1.clone(), BlockSource::Mined)?;
    b.ledger().write().try_commit(b1.clone(), BlockSource::Mined)?;
    assert_ne!(a1.hash, b1.hash);

    let a2 = mine_on_tip(&a, "a2");
    assert_eq!(a.propose_and_commit(a2.clone()).await, RoundOutcome::Committed);

    let a_blocks = a.snapshot().blocks;
    let b_blocks = b.snapshot().blocks;
    assert_eq!(a_blocks.len(), 3);
    assert_eq!(a_blocks, b_blocks);
    assert_eq!(b_blocks[1], a1);
    assert_eq!(b_blocks[2], a2);
    assert!(Ledger::is_chain_valid(&b_blocks, D));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn proposer_behind_adopts_longer_chain() -> anyhow::Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;
    connect(&a, &b);

    for data in ["b1", "b2"] {
        let block = mine_on_tip(&b, data);
        b.ledger().write().try_commit(block, BlockSource::Mined)?;
    }
    let b_attempt = b.mining().next_attempt().expect("b is allowed to mine");

    let stale = mine_on_tip(&a, "a1");
    assert_eq!(a.propose_and_commit(stale.clone()).await, RoundOutcome::Superseded);

    assert_eq!(a.snapshot(), b.snapshot());
    assert_eq!(a.ledger().read().len(), 3);
    assert_ne!(a.ledger().read().blocks()[1], stale);

    // b's search was preempted, then resumed because it refused the block
    assert!(b_attempt.is_cancelled());
    assert!(!b.mining().is_paused());
    assert!(!a.mining().is_paused());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn receiver_behind_catches_up_then_accepts() -> anyhow::Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;
    connect(&a, &b);

    let a1 = mine_on_tip(&a, "a1");
    a.ledger().write().try_commit(a1, BlockSource::Mined)?;

    let a2 = mine_on_tip(&a, "a2");
    assert_eq!(a.propose_and_commit(a2.clone()).await, RoundOutcome::Committed);

    assert_eq!(b.ledger().read().len(), 3);
    assert_eq!(b.ledger().read().tip(), &a2);
    assert_eq!(a.snapshot(), b.snapshot());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unreachable_peer_does_not_block_commit() -> anyhow::Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;
    connect(&a, &b);
    a.peers().add("127.0.0.1:1");

    let block = mine_on_tip(&a, "best effort");
    assert_eq!(a.propose_and_commit(block.clone()).await, RoundOutcome::Committed);
    assert_eq!(b.ledger().read().tip(), &block);
    assert_eq!(a.ledger().read().tip(), &block);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tampered_proposal_is_refused_by_every_peer() -> anyhow::Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;
    connect(&a, &b);

    let mut forged = mine_on_tip(&a, "honest");
    forged.data = "forged".into();
    assert!(!forged.verify(D));

    assert_eq!(a.propose_and_commit(forged).await, RoundOutcome::Rejected);
    assert_eq!(b.ledger().read().len(), 1);
    assert_eq!(b.ledger().read().candidate_count(), 0);
    assert_eq!(a.ledger().read().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn accepted_but_uncommitted_proposal_releases_miner() -> anyhow::Result<()> {
    let b = spawn_node_with(|c| c.with_commit_timeout(Duration::from_millis(200))).await?;

    let block = mine_on_tip(&b, "never committed");
    let outcome = b.handle_proposal("127.0.0.1:9", block).await;
    assert_eq!(outcome, ProposalOutcome::Accepted);
    assert!(b.mining().is_paused());

    assert!(wait_until(Duration::from_secs(3), || !b.mining().is_paused()).await);
    assert_eq!(b.awaiting_commit(), None);
    assert_eq!(b.ledger().read().len(), 1);
    assert_eq!(b.ledger().read().candidate_count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn commit_of_candidate_that_no_longer_links_is_refused() -> anyhow::Result<()> {
    let b = spawn_node().await?;

    let proposed = mine_on_tip(&b, "proposed");
    assert_eq!(
        b.handle_proposal("127.0.0.1:9", proposed.clone()).await,
        ProposalOutcome::Accepted
    );

    let local = mine_on_tip(&b, "local");
    b.ledger().write().try_commit(local, BlockSource::Mined)?;

    match b.handle_commit(proposed) {
        Err(ApiError::Ledger(LedgerError::Link(LinkError::IndexBehind { .. }))) => {}
        other => panic!("unexpected commit result: {other:?}"),
    }
    assert_eq!(b.ledger().read().len(), 2);
    assert!(!b.mining().is_paused());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn join_floods_membership() -> anyhow::Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;
    connect(&a, &b);

    let a1 = mine_on_tip(&a, "a1");
    a.ledger().write().try_commit(a1.clone(), BlockSource::Mined)?;

    let c = spawn_node().await?;
    let known = c.join_network(a.address()).await?;
    assert_eq!(known, 2);

    assert!(c.peers().contains(a.address()));
    assert!(c.peers().contains(b.address()));
    assert!(a.peers().contains(c.address()));
    assert!(b.peers().contains(c.address()));
    assert!(!c.peers().contains(c.address()));

    // joining also syncs to the bootstrap's chain
    assert_eq!(c.ledger().read().tip(), &a1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn request_chain_never_shortens() -> anyhow::Result<()> {
    let a = spawn_node().await?;
    let b = spawn_node().await?;

    let a1 = mine_on_tip(&a, "a1");
    a.ledger().write().try_commit(a1, BlockSource::Mined)?;
    let b1 = mine_on_tip(&b, "b1");
    b.ledger().write().try_commit(b1.clone(), BlockSource::Mined)?;

    assert!(b.request_chain(a.address()).await.is_err());
    assert_eq!(b.ledger().read().tip(), &b1);
    // fetching registered b with a
    assert!(a.peers().contains(b.address()));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn miner_extends_chain_until_shutdown() -> anyhow::Result<()> {
    let node = spawn_node().await?;
    let handle = mining::start(node.clone())?;

    let grew = wait_until(Duration::from_secs(30), || node.ledger().read().height() >= 3).await;
    node.mining().shutdown();
    handle.join().await;

    assert!(grew, "miner did not extend the chain");
    let ledger = node.ledger().read();
    assert!(Ledger::is_chain_valid(ledger.blocks(), D));
    Ok(())
}
