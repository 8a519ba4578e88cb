mod common;

use common::*;
use position_manager::errors::PositionError;
use position_manager::params::*;

fn open_and_borrow() -> CreateLoanBorrowAndRebalanceParams {
    CreateLoanBorrowAndRebalanceParams {
        ref_id: 3,
        amounts: vec![100, 10],
        lp_tokens: 100,
        ratio: vec![1, 1],
        max_borrowed: u128::MAX,
        deadline: NOW,
        ..Default::default()
    }
}

#[test]
fn create_borrow_and_rebalance_runs_every_step() {
    let mut h = Harness::two_asset();
    let owner = h.owner;

    let receipt = h
        .engine
        .create_loan_borrow_and_rebalance(
            &owner,
            &owner,
            &CreateLoanBorrowAndRebalanceParams {
                min_collateral: vec![155, 155],
                ..open_and_borrow()
            },
        )
        .unwrap();

    assert_eq!(receipt.liquidity, 200);
    assert_eq!(receipt.tokens_held, vec![155, 155]);
    let loan = h.loan(receipt.loan_id);
    assert_eq!(loan.ref_id, 3);
    assert_eq!(loan.lp_tokens, 100);
    assert_eq!(loan.tokens_held, receipt.tokens_held);
    assert_eq!(h.store.by_owner(&owner, 0, 10)[0].loan_id, receipt.loan_id);
    assert_eq!(
        h.event_names(),
        vec!["CreateLoan", "IncreaseCollateral", "BorrowLiquidity", "LoanUpdate"]
    );
}

#[test]
fn failed_composite_leaves_no_loan_behind() {
    let mut h = Harness::two_asset();
    let owner = h.owner;

    let err = h
        .engine
        .create_loan_borrow_and_rebalance(
            &owner,
            &owner,
            &CreateLoanBorrowAndRebalanceParams {
                min_collateral: vec![156],
                ..open_and_borrow()
            },
        )
        .unwrap_err();

    assert_eq!(err, PositionError::AmountsMin.into());
    assert!(h.store.snapshot().is_empty());
    assert!(h.store.by_owner(&owner, 0, 10).is_empty());
    assert!(h.engine.events().is_empty());
    // The aborted call hands its id back.
    assert_eq!(h.open_loan(), ROUND * 100 + 1);
}

#[test]
fn create_without_borrow_only_posts_collateral() {
    let mut h = Harness::two_asset();
    let owner = h.owner;

    let receipt = h
        .engine
        .create_loan_borrow_and_rebalance(
            &owner,
            &owner,
            &CreateLoanBorrowAndRebalanceParams {
                lp_tokens: 0,
                ..open_and_borrow()
            },
        )
        .unwrap();
    assert_eq!(receipt.liquidity, 0);
    assert_eq!(receipt.tokens_held, vec![100, 10]);
}

#[test]
fn borrow_and_rebalance_withdraws_last() {
    let mut h = Harness::two_asset();
    let loan_id = h.funded_loan(vec![100, 10]);
    let owner = h.owner;

    let receipt = h
        .engine
        .borrow_and_rebalance(
            &owner,
            &BorrowAndRebalanceParams {
                loan_id,
                amounts: vec![10, 0],
                lp_tokens: 50,
                withdraw: vec![50, 0],
                to: owner,
                max_borrowed: u128::MAX,
                min_collateral: vec![110, 60],
                deadline: NOW,
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(receipt.liquidity, 100);
    assert_eq!(receipt.tokens_held, vec![110, 60]);
    assert_eq!(
        h.event_names(),
        vec!["IncreaseCollateral", "BorrowLiquidity", "DecreaseCollateral", "LoanUpdate"]
    );
}

#[test]
fn borrow_and_rebalance_guards_without_a_withdrawal() {
    let mut h = Harness::two_asset();
    let loan_id = h.funded_loan(vec![100, 10]);
    let owner = h.owner;
    let before = h.store.snapshot();

    let err = h
        .engine
        .borrow_and_rebalance(
            &owner,
            &BorrowAndRebalanceParams {
                loan_id,
                lp_tokens: 50,
                max_borrowed: u128::MAX,
                min_collateral: vec![10_000],
                deadline: NOW,
                ..Default::default()
            },
        )
        .unwrap_err();

    assert_eq!(err, PositionError::AmountsMin.into());
    assert_eq!(h.store.snapshot(), before);
}

#[test]
fn empty_withdraw_skips_the_collateral_guard() {
    let mut h = Harness::two_asset();
    let loan_id = h.borrowed_loan(vec![100, 10], 100);
    let owner = h.owner;

    let receipt = h
        .engine
        .rebalance_repay_and_withdraw(
            &owner,
            &RebalanceRepayAndWithdrawParams {
                loan_id,
                liquidity: 50,
                min_collateral: vec![u64::MAX],
                deadline: NOW,
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(receipt.liquidity, 150);
    assert_eq!(receipt.tokens_held, vec![175, 85]);
}

#[test]
fn all_zero_withdraw_still_runs_the_collateral_guard() {
    let mut h = Harness::two_asset();
    let loan_id = h.borrowed_loan(vec![100, 10], 100);
    let owner = h.owner;
    let before = h.store.snapshot();

    let err = h
        .engine
        .rebalance_repay_and_withdraw(
            &owner,
            &RebalanceRepayAndWithdrawParams {
                loan_id,
                liquidity: 50,
                withdraw: vec![0, 0],
                min_collateral: vec![u64::MAX],
                deadline: NOW,
                ..Default::default()
            },
        )
        .unwrap_err();

    assert_eq!(err, PositionError::AmountsMin.into());
    assert_eq!(h.store.snapshot(), before);
}

#[test]
fn rebalance_runs_before_repay() {
    let mut h = Harness::two_asset();
    let loan_id = h.borrowed_loan(vec![100, 10], 100);
    let owner = h.owner;

    h.engine
        .rebalance_repay_and_withdraw(
            &owner,
            &RebalanceRepayAndWithdrawParams {
                loan_id,
                deltas: vec![-10, 10],
                liquidity: 200,
                deadline: NOW,
                ..Default::default()
            },
        )
        .unwrap();

    // [200, 110] -> [190, 120] -> minus [100, 100]
    assert_eq!(h.loan(loan_id).tokens_held, vec![90, 20]);
    assert_eq!(
        h.event_names(),
        vec!["RebalanceCollateral", "RepayLiquidity", "LoanUpdate"]
    );
}

#[test]
fn nothing_to_repay_skips_the_pool() {
    let mut h = Harness::two_asset();
    let loan_id = h.borrowed_loan(vec![100, 10], 100);
    let owner = h.owner;

    h.engine
        .rebalance_repay_and_withdraw(
            &owner,
            &RebalanceRepayAndWithdrawParams {
                loan_id,
                deadline: NOW,
                ..Default::default()
            },
        )
        .unwrap();

    assert!(!h.engine.pool().calls().contains(&"repay_liquidity"));
    assert_eq!(h.loan(loan_id).liquidity, 200);
}

#[test]
fn close_loan_clears_debt_and_collateral() {
    let mut h = Harness::two_asset();
    let loan_id = h.borrowed_loan(vec![100, 10], 100);
    let owner = h.owner;

    let receipt = h
        .engine
        .close_loan(
            &owner,
            &RebalanceRepayAndWithdrawParams {
                loan_id,
                liquidity: 200,
                withdraw: vec![100, 10],
                to: owner,
                min_collateral: vec![0, 0],
                deadline: NOW,
                ..Default::default()
            },
        )
        .unwrap();

    assert_eq!(receipt.liquidity, 0);
    assert_eq!(receipt.tokens_held, vec![0, 0]);
    // Closing zeroes the record; it does not remove it.
    assert!(h.loan(loan_id).is_closed());
    assert_eq!(h.store.by_owner(&owner, 0, 10)[0].loan_id, loan_id);
    assert_eq!(
        h.event_names(),
        vec!["RepayLiquidity", "DecreaseCollateral", "LoanUpdate"]
    );
}

#[test]
fn close_loan_by_ratio_repays_everything() {
    let mut h = Harness::two_asset();
    let loan_id = h.borrowed_loan(vec![100, 10], 100);
    let owner = h.owner;

    let receipt = h
        .engine
        .close_loan(
            &owner,
            &RebalanceRepayAndWithdrawParams {
                loan_id,
                is_ratio: true,
                repay_ratio: vec![1, 1],
                deadline: NOW,
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(receipt.liquidity, 0);
    assert_eq!(receipt.tokens_held, vec![55, 55]);
}

#[test]
fn close_loan_with_debt_left_fails() {
    let mut h = Harness::two_asset();
    let loan_id = h.borrowed_loan(vec![100, 10], 100);
    let owner = h.owner;
    let before = h.store.snapshot();

    let err = h
        .engine
        .close_loan(
            &owner,
            &RebalanceRepayAndWithdrawParams {
                loan_id,
                liquidity: 50,
                deadline: NOW,
                ..Default::default()
            },
        )
        .unwrap_err();

    assert_eq!(err, PositionError::LoanNotClosed.into());
    assert_eq!(h.store.snapshot(), before);
    assert!(h.engine.events().is_empty());
}

#[test]
fn expired_composite_touches_nothing() {
    let mut h = Harness::two_asset();
    let loan_id = h.borrowed_loan(vec![100, 10], 100);
    let owner = h.owner;
    let before = h.store.snapshot();
    let calls = h.engine.pool().calls().len();

    let err = h
        .engine
        .close_loan(
            &owner,
            &RebalanceRepayAndWithdrawParams {
                loan_id,
                liquidity: 200,
                deadline: NOW - 1,
                ..Default::default()
            },
        )
        .unwrap_err();

    assert_eq!(err, PositionError::Expired.into());
    assert_eq!(h.store.snapshot(), before);
    assert_eq!(h.engine.pool().calls().len(), calls);
}
