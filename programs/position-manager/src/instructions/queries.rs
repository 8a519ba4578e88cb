use anchor_lang::prelude::*;
use crate::constants::*;
use crate::state::*;

/// Read a page of an owner's loans across all pools
///
/// Entries come back in insertion order. Tombstones (`loan_id == 0`) are
/// included so offsets stay stable; callers skip them.
#[derive(Accounts)]
pub struct LoansByOwner<'info> {
    #[account(
        seeds = [OWNER_INDEX_SEED, index.owner.as_ref()],
        bump = index.bump
    )]
    pub index: Account<'info, LoanIndex>,
}

pub fn by_owner_handler(ctx: Context<LoansByOwner>, offset: u64, limit: u64) -> Result<Vec<IndexSlot>> {
    Ok(ctx.accounts.index.page(offset, limit))
}

/// Number of loans the index owner currently holds
pub fn balance_handler(ctx: Context<LoansByOwner>) -> Result<u64> {
    Ok(ctx.accounts.index.live().count() as u64)
}

/// Same as `LoansByOwner`, scoped to one pool
#[derive(Accounts)]
pub struct LoansByOwnerAndPool<'info> {
    #[account(
        seeds = [OWNER_POOL_INDEX_SEED, index.owner.as_ref(), index.pool.as_ref()],
        bump = index.bump
    )]
    pub index: Account<'info, LoanIndex>,
}

pub fn by_owner_and_pool_handler(
    ctx: Context<LoansByOwnerAndPool>,
    offset: u64,
    limit: u64,
) -> Result<Vec<IndexSlot>> {
    Ok(ctx.accounts.index.page(offset, limit))
}
