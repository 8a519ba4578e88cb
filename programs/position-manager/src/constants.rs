/// Seed of the singleton manager configuration
pub const CONFIG_SEED: &[u8] = b"config";

/// Seed of the PDA that signs pool and rebalancer CPIs
pub const MANAGER_AUTHORITY_SEED: &[u8] = b"manager";

/// Seed of the delegate PDA users approve for collateral pulls
pub const RELAY_SEED: &[u8] = b"relay";

pub const PROTOCOL_SEED: &[u8] = b"protocol";

pub const POOL_SEED: &[u8] = b"pool";

/// Seed a pool program signs with when it calls back into the relay
pub const POOL_AUTHORITY_SEED: &[u8] = b"pool_authority";

/// Seed of a pool's share mint, derived under the pool program
pub const SHARE_MINT_SEED: &[u8] = b"shares";

pub const LOAN_SEED: &[u8] = b"loan";

pub const OWNER_INDEX_SEED: &[u8] = b"owner_loans";

pub const OWNER_POOL_INDEX_SEED: &[u8] = b"owner_pool_loans";

/// Seed of an owner's blanket approval for an operator
pub const OPERATOR_SEED: &[u8] = b"operator";

/// Loan ids are `round * LOAN_ID_ROUND_MULTIPLIER + counter`
pub const LOAN_ID_ROUND_MULTIPLIER: u64 = 100;

/// Fewest assets a pool may be created with
pub const MIN_POOL_TOKENS: usize = 2;

/// Most assets a pool may be created with
pub const MAX_POOL_TOKENS: usize = 8;

/// Default protocol fee, scaled by 1e18 (5%)
pub const DEFAULT_FEE: u64 = 50_000_000_000_000_000;

/// Slots an owner index is created with
pub const INDEX_INITIAL_SLOTS: usize = 4;

/// Slots added each time an owner index runs out of room
pub const INDEX_GROWTH_SLOTS: usize = 8;
