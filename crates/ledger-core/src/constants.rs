pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const GENESIS_BODY: &str = "Genesis block";
pub const DEFAULT_DIFFICULTY: usize = 3;
pub const MAX_DIFFICULTY: usize = HASH_HEX_SIZE;
/// How many nonces the search tries between cancellation checks.
pub const NONCES_PER_CANCEL_CHECK: u64 = 1024;
