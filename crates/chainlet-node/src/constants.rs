pub const DEFAULT_ADDRESS: &str = "127.0.0.1:3000";
/// Highest difficulty the node accepts. Genesis is mined at startup, and each
/// extra bit doubles the expected work.
pub const MAX_DIFFICULTY: u32 = 32;
pub const DEFAULT_COMMIT_TIMEOUT_SECS: u64 = 10;
pub(crate) const MINED_CHANNEL_CAPACITY: usize = 1;
