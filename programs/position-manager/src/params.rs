//! Instruction parameter records

use anchor_lang::prelude::*;

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct DepositNoPullParams {
    /// Pool shares already held in custody for the caller
    pub lp_tokens: u64,
    pub to: Pubkey,
    pub deadline: i64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct WithdrawNoPullParams {
    pub shares: u64,
    pub to: Pubkey,
    pub deadline: i64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct DepositReservesParams {
    pub amounts_desired: Vec<u64>,
    pub amounts_min: Vec<u64>,
    pub to: Pubkey,
    pub deadline: i64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct WithdrawReservesParams {
    pub shares: u64,
    pub amounts_min: Vec<u64>,
    pub to: Pubkey,
    pub deadline: i64,
}

/// Shared by increase and decrease collateral
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CollateralParams {
    pub loan_id: u64,
    pub amounts: Vec<u64>,
    /// Recipient of withdrawn collateral; ignored on increase
    pub to: Pubkey,
    pub min_collateral: Vec<u64>,
    pub deadline: i64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BorrowLiquidityParams {
    pub loan_id: u64,
    pub lp_tokens: u64,
    pub ratio: Vec<u64>,
    pub min_borrowed: Vec<u64>,
    pub max_borrowed: u128,
    pub min_collateral: Vec<u64>,
    pub deadline: i64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RepayLiquidityParams {
    pub loan_id: u64,
    pub liquidity: u128,
    pub collateral_id: u8,
    pub to: Pubkey,
    /// Size the repayment from held collateral by `ratio` instead of `liquidity`
    pub is_ratio: bool,
    pub ratio: Vec<u64>,
    pub min_repaid: Vec<u64>,
    pub deadline: i64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RepayLiquidityWithLpParams {
    pub loan_id: u64,
    pub lp_tokens: u64,
    pub collateral_id: u8,
    pub to: Pubkey,
    pub min_collateral: Vec<u64>,
    pub deadline: i64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RebalanceCollateralParams {
    pub loan_id: u64,
    pub deltas: Vec<i64>,
    pub ratio: Vec<u64>,
    pub min_collateral: Vec<u64>,
    pub deadline: i64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalRebalanceParams {
    pub loan_id: u64,
    /// Collateral handed to the rebalancer
    pub amounts: Vec<u64>,
    /// Pool shares handed to the rebalancer
    pub lp_tokens: u64,
    /// `Pubkey::default()` skips the hand-off entirely
    pub rebalancer: Pubkey,
    pub data: Vec<u8>,
    pub min_collateral: Vec<u64>,
    pub deadline: i64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateLoanBorrowAndRebalanceParams {
    pub ref_id: u16,
    pub amounts: Vec<u64>,
    pub lp_tokens: u64,
    pub ratio: Vec<u64>,
    pub min_borrowed: Vec<u64>,
    pub max_borrowed: u128,
    pub min_collateral: Vec<u64>,
    pub deadline: i64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateLoanBorrowAndRebalanceExternallyParams {
    pub ref_id: u16,
    pub amounts: Vec<u64>,
    pub lp_tokens: u64,
    pub min_borrowed: Vec<u64>,
    pub max_borrowed: u128,
    pub rebalancer: Pubkey,
    pub rebalance_amounts: Vec<u64>,
    pub rebalance_lp_tokens: u64,
    pub data: Vec<u8>,
    pub min_collateral: Vec<u64>,
    pub deadline: i64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BorrowAndRebalanceParams {
    pub loan_id: u64,
    pub amounts: Vec<u64>,
    pub lp_tokens: u64,
    pub ratio: Vec<u64>,
    /// Empty skips the withdrawal
    pub withdraw: Vec<u64>,
    pub to: Pubkey,
    pub min_borrowed: Vec<u64>,
    pub max_borrowed: u128,
    pub min_collateral: Vec<u64>,
    pub deadline: i64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BorrowAndRebalanceExternallyParams {
    pub loan_id: u64,
    pub amounts: Vec<u64>,
    pub lp_tokens: u64,
    pub min_borrowed: Vec<u64>,
    pub max_borrowed: u128,
    pub rebalancer: Pubkey,
    pub rebalance_amounts: Vec<u64>,
    pub rebalance_lp_tokens: u64,
    pub data: Vec<u8>,
    pub withdraw: Vec<u64>,
    pub to: Pubkey,
    pub min_collateral: Vec<u64>,
    pub deadline: i64,
}

/// Also drives `close_loan`, which additionally requires the debt to reach zero
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RebalanceRepayAndWithdrawParams {
    pub loan_id: u64,
    pub deltas: Vec<i64>,
    pub ratio: Vec<u64>,
    pub liquidity: u128,
    pub collateral_id: u8,
    pub is_ratio: bool,
    pub repay_ratio: Vec<u64>,
    pub withdraw: Vec<u64>,
    pub to: Pubkey,
    pub min_repaid: Vec<u64>,
    pub min_collateral: Vec<u64>,
    pub deadline: i64,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RebalanceExternallyAndRepayParams {
    pub loan_id: u64,
    pub rebalancer: Pubkey,
    pub rebalance_amounts: Vec<u64>,
    pub rebalance_lp_tokens: u64,
    pub data: Vec<u8>,
    pub liquidity: u128,
    pub collateral_id: u8,
    pub is_ratio: bool,
    pub repay_ratio: Vec<u64>,
    pub withdraw: Vec<u64>,
    pub to: Pubkey,
    pub min_repaid: Vec<u64>,
    pub min_collateral: Vec<u64>,
    pub deadline: i64,
}
