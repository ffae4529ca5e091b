pub mod api;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod mining;
pub mod node;
pub mod peers;
pub mod wire;

pub use config::{Args, NodeConfig};
pub use node::{Node, RoundOutcome};
pub use wire::ProposalOutcome;
