//! Event definitions

use anchor_lang::prelude::borsh;
use anchor_lang::prelude::*;

use crate::state::Loan;

#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct CreateLoan {
    pub pool: Pubkey,
    pub owner: Pubkey,
    pub loan_id: u64,
    pub ref_id: u16,
    pub timestamp: i64,
}

#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct IncreaseCollateral {
    pub pool: Pubkey,
    pub loan_id: u64,
    pub tokens_held: Vec<u64>,
    pub amounts: Vec<u64>,
    pub timestamp: i64,
}

#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct DecreaseCollateral {
    pub pool: Pubkey,
    pub loan_id: u64,
    pub tokens_held: Vec<u64>,
    pub amounts: Vec<u64>,
    pub to: Pubkey,
    pub timestamp: i64,
}

#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct BorrowLiquidity {
    pub pool: Pubkey,
    pub loan_id: u64,
    pub liquidity_borrowed: u128,
    pub amounts: Vec<u64>,
    pub timestamp: i64,
}

#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct RepayLiquidity {
    pub pool: Pubkey,
    pub loan_id: u64,
    pub liquidity_paid: u128,
    pub amounts: Vec<u64>,
    pub timestamp: i64,
}

/// Repayment sized from held collateral by a target ratio
#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct RepayLiquiditySetRatio {
    pub pool: Pubkey,
    pub loan_id: u64,
    pub liquidity_paid: u128,
    pub amounts: Vec<u64>,
    pub ratio: Vec<u64>,
    pub timestamp: i64,
}

/// Repayment settled with pool shares
#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct RepayLiquidityWithLP {
    pub pool: Pubkey,
    pub loan_id: u64,
    pub collateral_id: u8,
    pub lp_tokens: u64,
    pub liquidity_paid: u128,
    pub tokens_held: Vec<u64>,
    pub timestamp: i64,
}

#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct RebalanceCollateral {
    pub pool: Pubkey,
    pub loan_id: u64,
    pub tokens_held: Vec<u64>,
    pub timestamp: i64,
}

#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct RebalanceCollateralExternally {
    pub pool: Pubkey,
    pub loan_id: u64,
    pub rebalancer: Pubkey,
    pub loan_liquidity: u128,
    pub tokens_held: Vec<u64>,
    pub timestamp: i64,
}

/// Full loan snapshot, emitted once per committed pipeline
#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct LoanUpdate {
    pub loan_id: u64,
    pub pool: Pubkey,
    pub owner: Pubkey,
    pub tokens_held: Vec<u64>,
    pub liquidity: u128,
    pub lp_tokens: u64,
    pub init_liquidity: u128,
    pub timestamp: i64,
}

impl LoanUpdate {
    pub fn snapshot(loan: &Loan, timestamp: i64) -> Self {
        Self {
            loan_id: loan.id,
            pool: loan.pool,
            owner: loan.owner,
            tokens_held: loan.tokens_held.clone(),
            liquidity: loan.liquidity,
            lp_tokens: loan.lp_tokens,
            init_liquidity: loan.init_liquidity,
            timestamp,
        }
    }
}

#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct LoanTransferred {
    pub loan_id: u64,
    pub pool: Pubkey,
    pub from: Pubkey,
    pub to: Pubkey,
    pub timestamp: i64,
}

#[event]
pub struct Approval {
    pub loan_id: u64,
    pub owner: Pubkey,
    pub approved: Pubkey,
    pub timestamp: i64,
}

#[event]
pub struct ApprovalForAll {
    pub owner: Pubkey,
    pub operator: Pubkey,
    pub approved: bool,
    pub timestamp: i64,
}

#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct DepositNoPull {
    pub pool: Pubkey,
    pub to: Pubkey,
    pub lp_tokens: u64,
    pub shares: u64,
    pub timestamp: i64,
}

#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct WithdrawNoPull {
    pub pool: Pubkey,
    pub to: Pubkey,
    pub shares: u64,
    pub assets: u64,
    pub timestamp: i64,
}

#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct DepositReserve {
    pub pool: Pubkey,
    pub to: Pubkey,
    pub reserves: Vec<u64>,
    pub shares: u64,
    pub timestamp: i64,
}

#[event]
#[derive(Debug, PartialEq, Eq)]
pub struct WithdrawReserve {
    pub pool: Pubkey,
    pub to: Pubkey,
    pub reserves: Vec<u64>,
    pub assets: u64,
    pub timestamp: i64,
}

#[event]
pub struct PoolCreated {
    pub pool: Pubkey,
    pub protocol_id: u16,
    pub cfmm: Pubkey,
    pub tokens: Vec<Pubkey>,
    pub pool_count: u64,
    pub timestamp: i64,
}

#[event]
pub struct ProtocolAdded {
    pub protocol_id: u16,
    pub pool_program: Pubkey,
    pub timestamp: i64,
}

#[event]
pub struct FeeUpdated {
    pub fee: u64,
    pub fee_to: Pubkey,
    pub fee_to_setter: Pubkey,
    pub timestamp: i64,
}

/// Events produced by a lifecycle pipeline, in the order they happened
#[derive(Debug, PartialEq, Eq)]
pub enum LoanEvent {
    CreateLoan(CreateLoan),
    IncreaseCollateral(IncreaseCollateral),
    DecreaseCollateral(DecreaseCollateral),
    BorrowLiquidity(BorrowLiquidity),
    RepayLiquidity(RepayLiquidity),
    RepayLiquiditySetRatio(RepayLiquiditySetRatio),
    RepayLiquidityWithLP(RepayLiquidityWithLP),
    RebalanceCollateral(RebalanceCollateral),
    RebalanceCollateralExternally(RebalanceCollateralExternally),
    LoanUpdate(LoanUpdate),
    LoanTransferred(LoanTransferred),
    DepositNoPull(DepositNoPull),
    WithdrawNoPull(WithdrawNoPull),
    DepositReserve(DepositReserve),
    WithdrawReserve(WithdrawReserve),
}

impl LoanEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateLoan(_) => "CreateLoan",
            Self::IncreaseCollateral(_) => "IncreaseCollateral",
            Self::DecreaseCollateral(_) => "DecreaseCollateral",
            Self::BorrowLiquidity(_) => "BorrowLiquidity",
            Self::RepayLiquidity(_) => "RepayLiquidity",
            Self::RepayLiquiditySetRatio(_) => "RepayLiquiditySetRatio",
            Self::RepayLiquidityWithLP(_) => "RepayLiquidityWithLP",
            Self::RebalanceCollateral(_) => "RebalanceCollateral",
            Self::RebalanceCollateralExternally(_) => "RebalanceCollateralExternally",
            Self::LoanUpdate(_) => "LoanUpdate",
            Self::LoanTransferred(_) => "LoanTransferred",
            Self::DepositNoPull(_) => "DepositNoPull",
            Self::WithdrawNoPull(_) => "WithdrawNoPull",
            Self::DepositReserve(_) => "DepositReserve",
            Self::WithdrawReserve(_) => "WithdrawReserve",
        }
    }
}

/// Emit every collected event. Called once a pipeline has fully succeeded.
pub fn emit_all(events: Vec<LoanEvent>) {
    for event in events {
        match event {
            LoanEvent::CreateLoan(e) => emit!(e),
            LoanEvent::IncreaseCollateral(e) => emit!(e),
            LoanEvent::DecreaseCollateral(e) => emit!(e),
            LoanEvent::BorrowLiquidity(e) => emit!(e),
            LoanEvent::RepayLiquidity(e) => emit!(e),
            LoanEvent::RepayLiquiditySetRatio(e) => emit!(e),
            LoanEvent::RepayLiquidityWithLP(e) => emit!(e),
            LoanEvent::RebalanceCollateral(e) => emit!(e),
            LoanEvent::RebalanceCollateralExternally(e) => emit!(e),
            LoanEvent::LoanUpdate(e) => emit!(e),
            LoanEvent::LoanTransferred(e) => emit!(e),
            LoanEvent::DepositNoPull(e) => emit!(e),
            LoanEvent::WithdrawNoPull(e) => emit!(e),
            LoanEvent::DepositReserve(e) => emit!(e),
            LoanEvent::WithdrawReserve(e) => emit!(e),
        }
    }
}
