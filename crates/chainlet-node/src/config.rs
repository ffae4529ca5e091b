use crate::constants::{DEFAULT_ADDRESS, DEFAULT_COMMIT_TIMEOUT_SECS, MAX_DIFFICULTY};
use chainlet_core::constants::POW_TARGET_DIFFICULTY;
use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "chainlet-node")]
#[command(about = "Proof-of-work ledger node that gossips blocks to its peers")]
pub struct Args {
    /// Address peers use to reach this node, e.g. 127.0.0.1:3000
    #[arg(long, default_value = DEFAULT_ADDRESS)]
    pub address: String,

    /// Socket address to bind (defaults to --address)
    #[arg(long)]
    pub listen: Option<String>,

    /// Known peer to join the network through
    #[arg(long)]
    pub bootstrap: Option<String>,

    /// Required leading zero bits in a block hash (at most 32)
    #[arg(long, default_value_t = POW_TARGET_DIFFICULTY, value_parser = clap::value_parser!(u32).range(0..=MAX_DIFFICULTY as i64))]
    pub difficulty: u32,

    /// Serve and validate, but never mine
    #[arg(long)]
    pub no_mine: bool,

    /// Resume mining if an accepted proposal is not committed within this many seconds
    #[arg(long, default_value_t = DEFAULT_COMMIT_TIMEOUT_SECS)]
    pub commit_timeout_secs: u64,

    /// Per-request timeout for peer RPCs; unbounded when omitted
    #[arg(long)]
    pub rpc_timeout_secs: Option<u64>,
}

impl Args {
    pub fn listen_addr(&self) -> &str {
        self.listen.as_deref().unwrap_or(&self.address)
    }
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub address: String,
    pub difficulty: u32,
    pub mine: bool,
    pub commit_timeout: Duration,
    pub rpc_timeout: Option<Duration>,
}

impl NodeConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            difficulty: POW_TARGET_DIFFICULTY,
            mine: true,
            commit_timeout: Duration::from_secs(DEFAULT_COMMIT_TIMEOUT_SECS),
            rpc_timeout: None,
        }
    }

    pub fn with_difficulty(mut self, difficulty: u32) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_mining(mut self, mine: bool) -> Self {
        self.mine = mine;
        self
    }

    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }
}

impl From<&Args> for NodeConfig {
    fn from(args: &Args) -> Self {
        Self {
            address: args.address.clone(),
            difficulty: args.difficulty,
            mine: !args.no_mine,
            commit_timeout: Duration::from_secs(args.commit_timeout_secs),
            rpc_timeout: args.rpc_timeout_secs.map(Duration::from_secs),
        }
    }
}
