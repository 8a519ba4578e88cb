use anchor_lang::prelude::*;

#[error_code]
pub enum PositionError {
    #[msg("Returned amounts fall below the requested minimums")]
    AmountsMin,

    #[msg("Borrowed liquidity exceeds the requested ceiling")]
    MaxBorrowed,

    #[msg("Repaid amounts fall below the requested minimums")]
    MinRepaid,

    #[msg("Transaction deadline has passed")]
    Expired,

    #[msg("No pool registered for this protocol and cfmm")]
    PoolNotFound,

    #[msg("Pool assets must be distinct")]
    IdenticalAssets,

    #[msg("Zero address not allowed")]
    ZeroAddress,

    #[msg("Pool already exists")]
    PoolExists,

    #[msg("Custody relay may only be invoked by the pool of the in-flight operation")]
    NotAuthorizedCaller,

    #[msg("Unknown loan id")]
    UnknownPosition,

    #[msg("Caller may not change this setting")]
    Forbidden,

    #[msg("Protocol has not been registered")]
    ProtocolNotSet,

    #[msg("Protocol id must be non-zero")]
    InvalidProtocol,

    #[msg("Pool asset count out of range")]
    InvalidTokenCount,

    #[msg("Math overflow")]
    MathOverflow,

    #[msg("Amount must be greater than zero")]
    ZeroAmount,

    #[msg("More amounts than collateral slots")]
    InvalidAmountsLength,

    #[msg("Pool reported holdings for the wrong number of collateral slots")]
    InvalidCollateralSlots,

    #[msg("Insufficient collateral held by the loan")]
    InsufficientCollateral,

    #[msg("Caller does not own this loan")]
    NotLoanOwner,

    #[msg("Loan belongs to a different pool")]
    PoolMismatch,

    #[msg("Pool repaid more liquidity than the loan owes")]
    RepayExceedsDebt,

    #[msg("Loan still carries debt")]
    LoanNotClosed,

    #[msg("Loan id space exhausted for this slot")]
    LoanIdSpaceExhausted,

    #[msg("Rebalancer account does not match the requested rebalancer")]
    InvalidRebalancer,

    #[msg("Rebalance needs deltas or a ratio")]
    EmptyRebalance,

    #[msg("Loan already belongs to this owner")]
    InvalidRecipient,

    #[msg("Pool returned no or malformed data")]
    PoolResponseInvalid,

    #[msg("Token account not found among the supplied accounts")]
    TokenAccountNotFound,

    #[msg("Required account was not provided")]
    AccountNotProvided,
}
