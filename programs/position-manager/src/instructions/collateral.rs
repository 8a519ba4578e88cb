use anchor_lang::prelude::*;
use crate::engine::{CollateralReceipt, LoanReceipt};
use crate::events::emit_all;
use crate::instructions::loan::ManageLoan;
use crate::params::*;

/// Post more collateral; tokens are pulled from the owner through the relay
pub fn increase_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
    params: CollateralParams,
) -> Result<CollateralReceipt> {
    let owner = ctx.accounts.owner.key();
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let receipt = engine.increase_collateral(&owner, &params)?;
    emit_all(engine.take_events());
    msg!("loan {}: collateral increased", receipt.loan_id);
    Ok(receipt)
}

pub fn decrease_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
    params: CollateralParams,
) -> Result<CollateralReceipt> {
    let owner = ctx.accounts.owner.key();
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let receipt = engine.decrease_collateral(&owner, &params)?;
    emit_all(engine.take_events());
    msg!("loan {}: collateral sent to {}", receipt.loan_id, params.to);
    Ok(receipt)
}

pub fn rebalance_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
    params: RebalanceCollateralParams,
) -> Result<LoanReceipt> {
    let owner = ctx.accounts.owner.key();
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let receipt = engine.rebalance_collateral(&owner, &params)?;
    emit_all(engine.take_events());
    msg!("loan {}: collateral rebalanced", receipt.loan_id);
    Ok(receipt)
}

pub fn rebalance_externally_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
    params: ExternalRebalanceParams,
) -> Result<LoanReceipt> {
    let owner = ctx.accounts.owner.key();
    let mut rebalancer = ctx.accounts.rebalancer(ctx.remaining_accounts);
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let receipt = engine.rebalance_collateral_externally(&owner, &params, &mut rebalancer)?;
    emit_all(engine.take_events());
    msg!("loan {}: rebalanced by {}", receipt.loan_id, params.rebalancer);
    Ok(receipt)
}
