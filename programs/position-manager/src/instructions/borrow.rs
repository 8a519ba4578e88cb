use anchor_lang::prelude::*;
use crate::engine::LoanReceipt;
use crate::events::emit_all;
use crate::instructions::loan::ManageLoan;
use crate::params::*;
use crate::pool::BorrowOutcome;

/// Borrow pool liquidity against a loan's collateral
///
/// Fails if the loan's total debt would exceed `max_borrowed` or if the
/// assets returned fall under `min_borrowed`.
pub fn handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
    params: BorrowLiquidityParams,
) -> Result<BorrowOutcome> {
    let owner = ctx.accounts.owner.key();
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let outcome = engine.borrow_liquidity(&owner, &params)?;
    emit_all(engine.take_events());
    msg!(
        "loan {}: borrowed {} liquidity for {} lp tokens",
        params.loan_id,
        outcome.liquidity_borrowed,
        params.lp_tokens
    );
    Ok(outcome)
}

pub fn borrow_and_rebalance_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
    params: BorrowAndRebalanceParams,
) -> Result<LoanReceipt> {
    let owner = ctx.accounts.owner.key();
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let receipt = engine.borrow_and_rebalance(&owner, &params)?;
    emit_all(engine.take_events());
    msg!("loan {}: liquidity now {}", receipt.loan_id, receipt.liquidity);
    Ok(receipt)
}

pub fn borrow_and_rebalance_externally_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
    params: BorrowAndRebalanceExternallyParams,
) -> Result<LoanReceipt> {
    let owner = ctx.accounts.owner.key();
    let mut rebalancer = ctx.accounts.rebalancer(ctx.remaining_accounts);
    let mut engine = ctx.accounts.engine(ctx.remaining_accounts)?;
    let receipt = engine.borrow_and_rebalance_externally(&owner, &params, &mut rebalancer)?;
    emit_all(engine.take_events());
    msg!("loan {}: liquidity now {}", receipt.loan_id, receipt.liquidity);
    Ok(receipt)
}
