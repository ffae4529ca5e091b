use chainlet_node::{api::router, mining, Args, Node, NodeConfig};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let node = Arc::new(Node::new(NodeConfig::from(&args))?);
    info!(
        address = node.address(),
        difficulty = node.difficulty(),
        genesis = %node.ledger().read().tip().hash_hex(),
        "node created"
    );

    let listener = tokio::net::TcpListener::bind(args.listen_addr()).await?;
    info!("chainlet-node listening on http://{}", listener.local_addr()?);
    let app = router(node.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    if let Some(bootstrap) = &args.bootstrap {
        match node.join_network(bootstrap).await {
            Ok(count) => info!(bootstrap = %bootstrap, peers = count, "joined network"),
            Err(err) => warn!(bootstrap = %bootstrap, error = %err, "could not join network"),
        }
    }

    let miner = if node.config().mine {
        Some(mining::start(node.clone())?)
    } else {
        None
    };

    server.await??;
    node.mining().shutdown();
    if let Some(miner) = miner {
        miner.join().await;
    }
    info!("node stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
