use anyhow::{Context, Result};
use chainlet_core::{ChainSnapshot, Ledger};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "chainlet-cli")]
#[command(about = "Inspect a running chainlet node")]
struct Cli {
    /// Node base URL (e.g. http://127.0.0.1:3000)
    #[arg(long, global = true, default_value = "http://127.0.0.1:3000")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the tip height and hash
    Head,
    /// Print every committed block
    Chain {
        /// Also check proof-of-work and links at this difficulty
        #[arg(long)]
        verify: Option<u32>,
    },
    /// List the node's known peers
    Peers,
}

#[derive(Deserialize)]
struct Head {
    height: u64,
    hash: String,
}

#[derive(Deserialize)]
struct PeerList {
    peers: Vec<String>,
}

async fn get_json<T: serde::de::DeserializeOwned>(client: &reqwest::Client, url: String) -> Result<T> {
    debug!(%url, "GET");
    let res = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("requesting {url}"))?
        .error_for_status()?;
    Ok(res.json().await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let node = cli.node.trim_end_matches('/');

    match cli.cmd {
        Command::Head => {
            let head: Head = get_json(&client, format!("{node}/chain/head")).await?;
            println!("height: {}", head.height);
            println!("hash:   {}", head.hash);
        }
        Command::Chain { verify } => {
            let chain: ChainSnapshot = get_json(&client, format!("{node}/blocks")).await?;
            for block in &chain.blocks {
                println!("{}", "=".repeat(50));
                println!("{block}");
            }
            if let Some(difficulty) = verify {
                let valid = Ledger::is_chain_valid(&chain.blocks, difficulty);
                println!("{}", "=".repeat(50));
                println!("valid at difficulty {difficulty}: {valid}");
            }
        }
        Command::Peers => {
            let list: PeerList = get_json(&client, format!("{node}/peers")).await?;
            if list.peers.is_empty() {
                println!("no peers");
            }
            for peer in list.peers {
                println!("{peer}");
            }
        }
    }
    Ok(())
}
