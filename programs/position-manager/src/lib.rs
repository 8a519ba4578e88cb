use anchor_lang::prelude::*;

pub mod constants;
pub mod errors;
pub mod events;
pub mod math;
pub mod state;
pub mod params;
pub mod resolver;
pub mod custody;
pub mod pool;
pub mod rebalancer;
pub mod ledger;
pub mod engine;
pub mod instructions;

use instructions::*;
use crate::custody::RelayContext;
use crate::engine::{CollateralReceipt, LoanReceipt};
use crate::params::*;
use crate::pool::{BorrowOutcome, RepayOutcome, ReservesMoved};

declare_id!("55dguVYFSfFvDHo5Qv6ZuYyhL7GUjDs81qJgxS2uih8M");

#[program]
pub mod position_manager {
    use super::*;

    /// Initialize the manager configuration
    pub fn initialize(ctx: Context<Initialize>, fee: Option<u64>) -> Result<()> {
        instructions::admin::handler(ctx, fee)
    }

    pub fn set_fee(ctx: Context<UpdateFees>, fee: u64) -> Result<()> {
        instructions::admin::set_fee_handler(ctx, fee)
    }

    pub fn set_fee_to(ctx: Context<UpdateFees>, fee_to: Pubkey) -> Result<()> {
        instructions::admin::set_fee_to_handler(ctx, fee_to)
    }

    pub fn set_fee_to_setter(ctx: Context<UpdateFees>, fee_to_setter: Pubkey) -> Result<()> {
        instructions::admin::set_fee_to_setter_handler(ctx, fee_to_setter)
    }

    /// Register the program that implements pools of `protocol_id`
    pub fn add_protocol(ctx: Context<AddProtocol>, protocol_id: u16) -> Result<()> {
        instructions::admin::add_protocol_handler(ctx, protocol_id)
    }

    /// Create the pool for `(protocol_id, cfmm)` and return its address
    pub fn create_pool(
        ctx: Context<CreatePool>,
        protocol_id: u16,
        cfmm: Pubkey,
        tokens: Vec<Pubkey>,
    ) -> Result<Pubkey> {
        instructions::factory::handler(ctx, protocol_id, cfmm, tokens)
    }

    pub fn deposit_no_pull<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManagePool<'info>>,
        params: DepositNoPullParams,
    ) -> Result<u64> {
        instructions::liquidity::deposit_no_pull_handler(ctx, params)
    }

    pub fn withdraw_no_pull<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManagePool<'info>>,
        params: WithdrawNoPullParams,
    ) -> Result<u64> {
        instructions::liquidity::withdraw_no_pull_handler(ctx, params)
    }

    pub fn deposit_reserves<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManagePool<'info>>,
        params: DepositReservesParams,
    ) -> Result<ReservesMoved> {
        instructions::liquidity::deposit_reserves_handler(ctx, params)
    }

    pub fn withdraw_reserves<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManagePool<'info>>,
        params: WithdrawReservesParams,
    ) -> Result<ReservesMoved> {
        instructions::liquidity::withdraw_reserves_handler(ctx, params)
    }

    /// Open an empty loan for `owner`
    pub fn create_loan<'info>(
        ctx: Context<'_, '_, 'info, 'info, NewLoan<'info>>,
        owner: Pubkey,
        ref_id: u16,
        deadline: i64,
    ) -> Result<LoanReceipt> {
        instructions::loan::create_handler(ctx, owner, ref_id, deadline)
    }

    pub fn create_loan_borrow_and_rebalance<'info>(
        ctx: Context<'_, '_, 'info, 'info, NewLoan<'info>>,
        owner: Pubkey,
        params: CreateLoanBorrowAndRebalanceParams,
    ) -> Result<LoanReceipt> {
        instructions::loan::create_borrow_and_rebalance_handler(ctx, owner, params)
    }

    pub fn create_loan_borrow_and_rebalance_externally<'info>(
        ctx: Context<'_, '_, 'info, 'info, NewLoan<'info>>,
        owner: Pubkey,
        params: CreateLoanBorrowAndRebalanceExternallyParams,
    ) -> Result<LoanReceipt> {
        instructions::loan::create_borrow_and_rebalance_externally_handler(ctx, owner, params)
    }

    pub fn increase_collateral<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
        params: CollateralParams,
    ) -> Result<CollateralReceipt> {
        instructions::collateral::increase_handler(ctx, params)
    }

    pub fn decrease_collateral<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
        params: CollateralParams,
    ) -> Result<CollateralReceipt> {
        instructions::collateral::decrease_handler(ctx, params)
    }

    pub fn rebalance_collateral<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
        params: RebalanceCollateralParams,
    ) -> Result<LoanReceipt> {
        instructions::collateral::rebalance_handler(ctx, params)
    }

    /// Hand collateral to an external rebalancer program for one call
    pub fn rebalance_collateral_externally<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
        params: ExternalRebalanceParams,
    ) -> Result<LoanReceipt> {
        instructions::collateral::rebalance_externally_handler(ctx, params)
    }

    pub fn borrow_liquidity<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
        params: BorrowLiquidityParams,
    ) -> Result<BorrowOutcome> {
        instructions::borrow::handler(ctx, params)
    }

    pub fn borrow_and_rebalance<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
        params: BorrowAndRebalanceParams,
    ) -> Result<LoanReceipt> {
        instructions::borrow::borrow_and_rebalance_handler(ctx, params)
    }

    pub fn borrow_and_rebalance_externally<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
        params: BorrowAndRebalanceExternallyParams,
    ) -> Result<LoanReceipt> {
        instructions::borrow::borrow_and_rebalance_externally_handler(ctx, params)
    }

    pub fn repay_liquidity<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
        params: RepayLiquidityParams,
    ) -> Result<RepayOutcome> {
        instructions::repay::handler(ctx, params)
    }

    pub fn repay_liquidity_with_lp<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
        params: RepayLiquidityWithLpParams,
    ) -> Result<RepayOutcome> {
        instructions::repay::with_lp_handler(ctx, params)
    }

    pub fn rebalance_repay_and_withdraw<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
        params: RebalanceRepayAndWithdrawParams,
    ) -> Result<LoanReceipt> {
        instructions::repay::rebalance_repay_and_withdraw_handler(ctx, params)
    }

    /// Repay and withdraw, failing unless the debt reaches zero
    pub fn close_loan<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
        params: RebalanceRepayAndWithdrawParams,
    ) -> Result<LoanReceipt> {
        instructions::repay::close_loan_handler(ctx, params)
    }

    pub fn rebalance_externally_and_repay_liquidity<'info>(
        ctx: Context<'_, '_, 'info, 'info, ManageLoan<'info>>,
        params: RebalanceExternallyAndRepayParams,
    ) -> Result<LoanReceipt> {
        instructions::repay::rebalance_externally_and_repay_handler(ctx, params)
    }

    pub fn transfer_loan(ctx: Context<TransferLoan>, new_owner: Pubkey) -> Result<()> {
        instructions::transfer::handler(ctx, new_owner)
    }

    pub fn approve_loan(ctx: Context<ApproveLoan>, approved: Pubkey) -> Result<()> {
        instructions::transfer::approve_handler(ctx, approved)
    }

    /// Let `operator` transfer any of the signer's loans, or revoke that
    pub fn set_approval_for_all(
        ctx: Context<SetApprovalForAll>,
        operator: Pubkey,
        approved: bool,
    ) -> Result<()> {
        instructions::transfer::set_approval_for_all_handler(ctx, operator, approved)
    }

    /// Page through an owner's loans; tombstones have `loan_id == 0`
    pub fn get_loans_by_owner(
        ctx: Context<LoansByOwner>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<state::IndexSlot>> {
        instructions::queries::by_owner_handler(ctx, offset, limit)
    }

    /// Live loans held by the index owner
    pub fn get_loan_balance(ctx: Context<LoansByOwner>) -> Result<u64> {
        instructions::queries::balance_handler(ctx)
    }

    pub fn get_loans_by_owner_and_pool(
        ctx: Context<LoansByOwnerAndPool>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<state::IndexSlot>> {
        instructions::queries::by_owner_and_pool_handler(ctx, offset, limit)
    }

    /// Pull tokens for a pool from a payer who approved the relay
    pub fn send_tokens_callback<'info>(
        ctx: Context<'_, '_, 'info, 'info, SendTokensCallback<'info>>,
        context: RelayContext,
        tokens: Vec<Pubkey>,
        amounts: Vec<u64>,
    ) -> Result<()> {
        instructions::relay::handler(ctx, context, tokens, amounts)
    }
}

pub use state::*;
pub use errors::*;
pub use constants::*;
pub use math::*;
