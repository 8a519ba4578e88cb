use anchor_lang::prelude::*;
use anchor_spl::token::Token;
use crate::constants::*;
use crate::custody::{CustodyRelay, SplTokenMover};
use crate::engine::{CallClock, LoanEngine};
use crate::events::emit_all;
use crate::ledger::NoPositions;
use crate::params::*;
use crate::pool::{CpiPool, ReservesMoved};
use crate::resolver::resolve_account;
use crate::state::*;

/// Move liquidity in or out of a pool without touching a loan
///
/// Token accounts and whatever the pool program needs are passed as
/// remaining accounts.
#[derive(Accounts)]
pub struct ManagePool<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,

    #[account(
        seeds = [CONFIG_SEED],
        bump = config.bump
    )]
    pub config: Account<'info, ManagerConfig>,

    /// CHECK: Resolved to a pool record in the handler
    pub pool: UncheckedAccount<'info>,

    /// CHECK: Signs pool CPIs, validated by seeds
    #[account(
        seeds = [MANAGER_AUTHORITY_SEED],
        bump = config.authority_bump
    )]
    pub manager_authority: UncheckedAccount<'info>,

    /// CHECK: Relay delegate, validated by seeds
    #[account(
        seeds = [RELAY_SEED],
        bump = config.relay_bump
    )]
    pub relay_authority: UncheckedAccount<'info>,

    /// CHECK: Compared with the program stored in the pool record
    pub pool_program: UncheckedAccount<'info>,

    pub token_program: Program<'info, Token>,
}

pub type PoolEngine<'info> = LoanEngine<NoPositions, CpiPool<'info>, SplTokenMover<'info>>;

impl<'info> ManagePool<'info> {
    pub fn engine(&self, remaining: &[AccountInfo<'info>]) -> Result<PoolEngine<'info>> {
        let handle = resolve_account(&self.pool.to_account_info())?;
        let pool = CpiPool::new(
            handle,
            self.pool.to_account_info(),
            self.pool_program.to_account_info(),
            self.manager_authority.to_account_info(),
            self.config.authority_bump,
            remaining,
        )?;
        let mover = SplTokenMover::new(
            self.token_program.to_account_info(),
            self.relay_authority.to_account_info(),
            self.config.relay_bump,
            remaining,
        );
        let clock = Clock::get()?;
        Ok(LoanEngine::new(
            NoPositions,
            pool,
            CustodyRelay::new(mover),
            CallClock::from(&clock),
        ))
    }
}

pub fn deposit_no_pull_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManagePool<'info>>,
    params: DepositNoPullParams,
) -> Result<u64> {
    let payer = ctx.accounts.payer.key();
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let shares = engine.deposit_no_pull(&payer, &params)?;
    emit_all(engine.take_events());
    msg!("deposited {} lp tokens for {} shares", params.lp_tokens, shares);
    Ok(shares)
}

pub fn withdraw_no_pull_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManagePool<'info>>,
    params: WithdrawNoPullParams,
) -> Result<u64> {
    let payer = ctx.accounts.payer.key();
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let assets = engine.withdraw_no_pull(&payer, &params)?;
    emit_all(engine.take_events());
    msg!("redeemed {} shares for {} lp tokens", params.shares, assets);
    Ok(assets)
}

pub fn deposit_reserves_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManagePool<'info>>,
    params: DepositReservesParams,
) -> Result<ReservesMoved> {
    let payer = ctx.accounts.payer.key();
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let moved = engine.deposit_reserves(&payer, &params)?;
    emit_all(engine.take_events());
    msg!("deposited {} reserve legs for {} shares", moved.reserves.len(), moved.amount);
    Ok(moved)
}

pub fn withdraw_reserves_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManagePool<'info>>,
    params: WithdrawReservesParams,
) -> Result<ReservesMoved> {
    let payer = ctx.accounts.payer.key();
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let moved = engine.withdraw_reserves(&payer, &params)?;
    emit_all(engine.take_events());
    msg!("withdrew {} reserve legs for {} shares", moved.reserves.len(), params.shares);
    Ok(moved)
}
