use anchor_lang::prelude::*;
use crate::engine::LoanReceipt;
use crate::events::emit_all;
use crate::instructions::loan::ManageLoan;
use crate::params::*;
use crate::pool::RepayOutcome;

/// Repay borrowed liquidity
///
/// With `is_ratio` set the pool sizes the repayment from held collateral by
/// `ratio` and the literal `liquidity` is ignored.
pub fn handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
    params: RepayLiquidityParams,
) -> Result<RepayOutcome> {
    let owner = ctx.accounts.owner.key();
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let outcome = engine.repay_liquidity(&owner, &params)?;
    emit_all(engine.take_events());
    msg!("loan {}: repaid {} liquidity", params.loan_id, outcome.liquidity_paid);
    Ok(outcome)
}

/// Repay with pool shares pulled from the owner
pub fn with_lp_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
    params: RepayLiquidityWithLpParams,
) -> Result<RepayOutcome> {
    let owner = ctx.accounts.owner.key();
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let outcome = engine.repay_liquidity_with_lp(&owner, &params)?;
    emit_all(engine.take_events());
    msg!(
        "loan {}: repaid {} liquidity with {} lp tokens",
        params.loan_id,
        outcome.liquidity_paid,
        params.lp_tokens
    );
    Ok(outcome)
}

pub fn rebalance_repay_and_withdraw_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
    params: RebalanceRepayAndWithdrawParams,
) -> Result<LoanReceipt> {
    let owner = ctx.accounts.owner.key();
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let receipt = engine.rebalance_repay_and_withdraw(&owner, &params)?;
    emit_all(engine.take_events());
    msg!("loan {}: liquidity now {}", receipt.loan_id, receipt.liquidity);
    Ok(receipt)
}

pub fn close_loan_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
    params: RebalanceRepayAndWithdrawParams,
) -> Result<LoanReceipt> {
    let owner = ctx.accounts.owner.key();
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let receipt = engine.close_loan(&owner, &params)?;
    emit_all(engine.take_events());
    msg!("loan {} closed", receipt.loan_id);
    Ok(receipt)
}

pub fn rebalance_externally_and_repay_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
    params: RebalanceExternallyAndRepayParams,
) -> Result<LoanReceipt> {
    let owner = ctx.accounts.owner.key();
    let mut rebalancer = ctx.accounts.rebalancer(ctx.remaining_accounts);
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let receipt =
        engine.rebalance_externally_and_repay_liquidity(&owner, &params, &mut rebalancer)?;
    emit_all(engine.take_events());
    msg!("loan {}: liquidity now {}", receipt.loan_id, receipt.liquidity);
    Ok(receipt)
}
