pub const BYTE: usize = 8;
pub const HASH_SIZE: usize = 32;
pub const HASH_BITS: u32 = (HASH_SIZE * BYTE) as u32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const POW_TARGET_DIFFICULTY: u32 = 20;
pub const GENESIS_DATA: &str = "Genesis Block";
/// 2024-01-01T00:00:00Z, shared by every node so genesis is reproducible.
pub const GENESIS_TIMESTAMP: u64 = 1_704_067_200;
