//! Loan lifecycle engine
//!
//! Every public operation runs a fixed pipeline against one pool. Steps work
//! on a local copy of the loan and the ledger is written once, at the end.
//! The exception is the external rebalance step: the loan is flushed before
//! the rebalancer runs and read back afterwards, because the rebalancer may
//! re-enter.
//!
//! Each operation checkpoints the store and the token mover first and rolls
//! both back if it fails, so earlier writes and token moves do not survive a
//! failed pipeline. Events are collected in order and discarded as well.

use anchor_lang::prelude::*;

use crate::custody::{CustodyRelay, RelayContext, TokenMover};
use crate::errors::PositionError;
use crate::events::*;
use crate::ledger::PositionStore;
use crate::math::{check_min_amounts, meets_minimums, sub_amounts};
use crate::params::*;
use crate::pool::{BorrowOutcome, LiquidityPool, RebalanceTarget, RepayMode, RepayOutcome, ReservesMoved};
use crate::rebalancer::{ExternalRebalancer, RebalanceRequest};
use crate::state::Loan;

/// Time as seen by one call: wall clock for deadlines, slot for loan ids
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallClock {
    pub now: i64,
    pub round: u64,
}

impl From<&Clock> for CallClock {
    fn from(clock: &Clock) -> Self {
        Self {
            now: clock.unix_timestamp,
            round: clock.slot,
        }
    }
}

/// Loan state handed back to the caller
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LoanReceipt {
    pub pool: Pubkey,
    pub loan_id: u64,
    pub tokens_held: Vec<u64>,
    pub liquidity: u128,
    pub lp_tokens: u64,
}

impl From<&Loan> for LoanReceipt {
    fn from(loan: &Loan) -> Self {
        Self {
            pool: loan.pool,
            loan_id: loan.id,
            tokens_held: loan.tokens_held.clone(),
            liquidity: loan.liquidity,
            lp_tokens: loan.lp_tokens,
        }
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CollateralReceipt {
    pub loan_id: u64,
    pub tokens_held: Vec<u64>,
    pub amounts: Vec<u64>,
}

struct RepayStep<'p> {
    liquidity: u128,
    collateral_id: u8,
    to: Pubkey,
    is_ratio: bool,
    ratio: &'p [u64],
    min_repaid: &'p [u64],
}

struct ExternalStep<'p> {
    rebalancer: Pubkey,
    amounts: &'p [u64],
    lp_tokens: u64,
    data: &'p [u8],
}

pub struct LoanEngine<S, P, M> {
    store: S,
    pool: P,
    relay: CustodyRelay<M>,
    clock: CallClock,
    events: Vec<LoanEvent>,
}

impl<S, P, M> LoanEngine<S, P, M>
where
    S: PositionStore,
    P: LiquidityPool,
    M: TokenMover,
{
    pub fn new(store: S, pool: P, relay: CustodyRelay<M>, clock: CallClock) -> Self {
        Self {
            store,
            pool,
            relay,
            clock,
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[LoanEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<LoanEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn relay(&self) -> &CustodyRelay<M> {
        &self.relay
    }

    pub fn set_clock(&mut self, clock: CallClock) {
        self.clock = clock;
    }

    // ------------------------------------------------------------------
    // Loans
    // ------------------------------------------------------------------

    pub fn create_loan(&mut self, owner: &Pubkey, ref_id: u16, deadline: i64) -> Result<LoanReceipt> {
        self.atomically(|engine| {
            engine.ensure_live(deadline)?;
            let loan = engine.open_loan(owner, ref_id)?;
            let loan = engine.register(loan)?;
            Ok(LoanReceipt::from(&loan))
        })
    }

    pub fn increase_collateral(
        &mut self,
        caller: &Pubkey,
        params: &CollateralParams,
    ) -> Result<CollateralReceipt> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            let mut loan = engine.load_owned(params.loan_id, caller)?;
            engine.step_increase(&mut loan, caller, &params.amounts)?;
            check_min_amounts(&loan.tokens_held, &params.min_collateral)?;
            engine.commit(&loan)?;
            Ok(CollateralReceipt {
                loan_id: loan.id,
                tokens_held: loan.tokens_held,
                amounts: params.amounts.clone(),
            })
        })
    }

    pub fn decrease_collateral(
        &mut self,
        caller: &Pubkey,
        params: &CollateralParams,
    ) -> Result<CollateralReceipt> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            let mut loan = engine.load_owned(params.loan_id, caller)?;
            engine.step_decrease(&mut loan, &params.amounts, &params.to)?;
            check_min_amounts(&loan.tokens_held, &params.min_collateral)?;
            engine.commit(&loan)?;
            Ok(CollateralReceipt {
                loan_id: loan.id,
                tokens_held: loan.tokens_held,
                amounts: params.amounts.clone(),
            })
        })
    }

    pub fn borrow_liquidity(
        &mut self,
        caller: &Pubkey,
        params: &BorrowLiquidityParams,
    ) -> Result<BorrowOutcome> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            let mut loan = engine.load_owned(params.loan_id, caller)?;
            let outcome = engine.step_borrow(
                &mut loan,
                params.lp_tokens,
                &params.ratio,
                &params.min_borrowed,
                params.max_borrowed,
            )?;
            check_min_amounts(&loan.tokens_held, &params.min_collateral)?;
            engine.commit(&loan)?;
            Ok(outcome)
        })
    }

    pub fn repay_liquidity(
        &mut self,
        caller: &Pubkey,
        params: &RepayLiquidityParams,
    ) -> Result<RepayOutcome> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            let mut loan = engine.load_owned(params.loan_id, caller)?;
            let outcome = engine.step_repay(
                &mut loan,
                RepayStep {
                    liquidity: params.liquidity,
                    collateral_id: params.collateral_id,
                    to: params.to,
                    is_ratio: params.is_ratio,
                    ratio: &params.ratio,
                    min_repaid: &params.min_repaid,
                },
            )?;
            engine.commit(&loan)?;
            Ok(outcome)
        })
    }

    pub fn repay_liquidity_with_lp(
        &mut self,
        caller: &Pubkey,
        params: &RepayLiquidityWithLpParams,
    ) -> Result<RepayOutcome> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            require!(params.lp_tokens > 0, PositionError::ZeroAmount);
            let mut loan = engine.load_owned(params.loan_id, caller)?;

            let context = engine.relay_context(caller);
            engine.relay.open(context.clone());
            let outcome = engine.pool.repay_liquidity_with_lp(
                &mut engine.relay,
                &context,
                &loan,
                params.lp_tokens,
                params.collateral_id,
                &params.to,
            );
            engine.relay.close();
            let outcome = outcome?;

            loan.record_repay(outcome.liquidity_paid)?;
            engine.adopt_holdings(&mut loan, outcome.tokens_held.clone())?;
            check_min_amounts(&loan.tokens_held, &params.min_collateral)?;
            engine.events.push(LoanEvent::RepayLiquidityWithLP(RepayLiquidityWithLP {
                pool: loan.pool,
                loan_id: loan.id,
                collateral_id: params.collateral_id,
                lp_tokens: params.lp_tokens,
                liquidity_paid: outcome.liquidity_paid,
                tokens_held: loan.tokens_held.clone(),
                timestamp: engine.clock.now,
            }));
            engine.commit(&loan)?;
            Ok(outcome)
        })
    }

    pub fn rebalance_collateral(
        &mut self,
        caller: &Pubkey,
        params: &RebalanceCollateralParams,
    ) -> Result<LoanReceipt> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            let target = RebalanceTarget::from_parts(&params.deltas, &params.ratio)
                .ok_or(PositionError::EmptyRebalance)?;
            let mut loan = engine.load_owned(params.loan_id, caller)?;
            engine.step_rebalance(&mut loan, &target)?;
            check_min_amounts(&loan.tokens_held, &params.min_collateral)?;
            engine.commit(&loan)?;
            Ok(LoanReceipt::from(&loan))
        })
    }

    pub fn rebalance_collateral_externally<R: ExternalRebalancer>(
        &mut self,
        caller: &Pubkey,
        params: &ExternalRebalanceParams,
        rebalancer: &mut R,
    ) -> Result<LoanReceipt> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            let loan = engine.load_owned(params.loan_id, caller)?;
            let loan = engine.step_external(
                loan,
                rebalancer,
                ExternalStep {
                    rebalancer: params.rebalancer,
                    amounts: &params.amounts,
                    lp_tokens: params.lp_tokens,
                    data: &params.data,
                },
            )?;
            check_min_amounts(&loan.tokens_held, &params.min_collateral)?;
            engine.commit(&loan)?;
            Ok(LoanReceipt::from(&loan))
        })
    }

    // ------------------------------------------------------------------
    // Composites
    // ------------------------------------------------------------------

    /// create, increase collateral, borrow (rebalancing to `ratio`), guard
    pub fn create_loan_borrow_and_rebalance(
        &mut self,
        owner: &Pubkey,
        payer: &Pubkey,
        params: &CreateLoanBorrowAndRebalanceParams,
    ) -> Result<LoanReceipt> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            let mut loan = engine.open_loan(owner, params.ref_id)?;
            if !params.amounts.is_empty() {
                engine.step_increase(&mut loan, payer, &params.amounts)?;
            }
            if params.lp_tokens > 0 {
                engine.step_borrow(
                    &mut loan,
                    params.lp_tokens,
                    &params.ratio,
                    &params.min_borrowed,
                    params.max_borrowed,
                )?;
            }
            check_min_amounts(&loan.tokens_held, &params.min_collateral)?;

            let loan = engine.register(loan)?;
            engine.push_update(&loan);
            Ok(LoanReceipt::from(&loan))
        })
    }

    /// create, increase collateral, borrow, external rebalance, guard
    pub fn create_loan_borrow_and_rebalance_externally<R: ExternalRebalancer>(
        &mut self,
        owner: &Pubkey,
        payer: &Pubkey,
        params: &CreateLoanBorrowAndRebalanceExternallyParams,
        rebalancer: &mut R,
    ) -> Result<LoanReceipt> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            let mut loan = engine.open_loan(owner, params.ref_id)?;
            if !params.amounts.is_empty() {
                engine.step_increase(&mut loan, payer, &params.amounts)?;
            }
            if params.lp_tokens > 0 {
                engine.step_borrow(
                    &mut loan,
                    params.lp_tokens,
                    &[],
                    &params.min_borrowed,
                    params.max_borrowed,
                )?;
            }

            // The loan must exist in the ledger before custody leaves it.
            let loan = engine.register(loan)?;
            let loan = engine.step_external(
                loan,
                rebalancer,
                ExternalStep {
                    rebalancer: params.rebalancer,
                    amounts: &params.rebalance_amounts,
                    lp_tokens: params.rebalance_lp_tokens,
                    data: &params.data,
                },
            )?;
            check_min_amounts(&loan.tokens_held, &params.min_collateral)?;
            engine.commit(&loan)?;
            Ok(LoanReceipt::from(&loan))
        })
    }

    /// increase collateral, borrow, withdraw, guard
    pub fn borrow_and_rebalance(
        &mut self,
        caller: &Pubkey,
        params: &BorrowAndRebalanceParams,
    ) -> Result<LoanReceipt> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            let mut loan = engine.load_owned(params.loan_id, caller)?;
            if !params.amounts.is_empty() {
                engine.step_increase(&mut loan, caller, &params.amounts)?;
            }
            if params.lp_tokens > 0 {
                engine.step_borrow(
                    &mut loan,
                    params.lp_tokens,
                    &params.ratio,
                    &params.min_borrowed,
                    params.max_borrowed,
                )?;
            }
            if !params.withdraw.is_empty() {
                engine.step_decrease(&mut loan, &params.withdraw, &params.to)?;
            }
            check_min_amounts(&loan.tokens_held, &params.min_collateral)?;
            engine.commit(&loan)?;
            Ok(LoanReceipt::from(&loan))
        })
    }

    /// increase collateral, borrow, external rebalance, withdraw, guard
    pub fn borrow_and_rebalance_externally<R: ExternalRebalancer>(
        &mut self,
        caller: &Pubkey,
        params: &BorrowAndRebalanceExternallyParams,
        rebalancer: &mut R,
    ) -> Result<LoanReceipt> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            let mut loan = engine.load_owned(params.loan_id, caller)?;
            if !params.amounts.is_empty() {
                engine.step_increase(&mut loan, caller, &params.amounts)?;
            }
            if params.lp_tokens > 0 {
                engine.step_borrow(
                    &mut loan,
                    params.lp_tokens,
                    &[],
                    &params.min_borrowed,
                    params.max_borrowed,
                )?;
            }
            let mut loan = engine.step_external(
                loan,
                rebalancer,
                ExternalStep {
                    rebalancer: params.rebalancer,
                    amounts: &params.rebalance_amounts,
                    lp_tokens: params.rebalance_lp_tokens,
                    data: &params.data,
                },
            )?;
            if !params.withdraw.is_empty() {
                engine.step_decrease(&mut loan, &params.withdraw, &params.to)?;
            }
            check_min_amounts(&loan.tokens_held, &params.min_collateral)?;
            engine.commit(&loan)?;
            Ok(LoanReceipt::from(&loan))
        })
    }

    /// rebalance, repay, withdraw; the collateral guard only runs when a
    /// withdrawal was requested
    pub fn rebalance_repay_and_withdraw(
        &mut self,
        caller: &Pubkey,
        params: &RebalanceRepayAndWithdrawParams,
    ) -> Result<LoanReceipt> {
        self.atomically(|engine| {
            let loan = engine.run_rebalance_repay_and_withdraw(caller, params)?;
            engine.commit(&loan)?;
            Ok(LoanReceipt::from(&loan))
        })
    }

    /// `rebalance_repay_and_withdraw` that must leave no debt behind
    pub fn close_loan(
        &mut self,
        caller: &Pubkey,
        params: &RebalanceRepayAndWithdrawParams,
    ) -> Result<LoanReceipt> {
        self.atomically(|engine| {
            let loan = engine.run_rebalance_repay_and_withdraw(caller, params)?;
            require!(loan.is_closed(), PositionError::LoanNotClosed);
            engine.commit(&loan)?;
            Ok(LoanReceipt::from(&loan))
        })
    }

    /// external rebalance, repay, withdraw
    pub fn rebalance_externally_and_repay_liquidity<R: ExternalRebalancer>(
        &mut self,
        caller: &Pubkey,
        params: &RebalanceExternallyAndRepayParams,
        rebalancer: &mut R,
    ) -> Result<LoanReceipt> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            let loan = engine.load_owned(params.loan_id, caller)?;
            let mut loan = engine.step_external(
                loan,
                rebalancer,
                ExternalStep {
                    rebalancer: params.rebalancer,
                    amounts: &params.rebalance_amounts,
                    lp_tokens: params.rebalance_lp_tokens,
                    data: &params.data,
                },
            )?;
            check_min_amounts(&loan.tokens_held, &params.min_collateral)?;
            if params.is_ratio || params.liquidity > 0 {
                engine.step_repay(
                    &mut loan,
                    RepayStep {
                        liquidity: params.liquidity,
                        collateral_id: params.collateral_id,
                        to: params.to,
                        is_ratio: params.is_ratio,
                        ratio: &params.repay_ratio,
                        min_repaid: &params.min_repaid,
                    },
                )?;
            }
            if !params.withdraw.is_empty() {
                engine.step_decrease(&mut loan, &params.withdraw, &params.to)?;
                check_min_amounts(&loan.tokens_held, &params.min_collateral)?;
            }
            engine.commit(&loan)?;
            Ok(LoanReceipt::from(&loan))
        })
    }

    // ------------------------------------------------------------------
    // Pool liquidity, no loan involved
    // ------------------------------------------------------------------

    /// Deposit the payer's cfmm lp tokens for pool shares
    pub fn deposit_no_pull(&mut self, payer: &Pubkey, params: &DepositNoPullParams) -> Result<u64> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            require!(params.lp_tokens > 0, PositionError::ZeroAmount);
            let context = engine.relay_context(payer);
            engine.relay.open(context.clone());
            let shares =
                engine
                    .pool
                    .deposit_no_pull(&mut engine.relay, &context, &params.to, params.lp_tokens);
            engine.relay.close();
            let shares = shares?;
            engine.events.push(LoanEvent::DepositNoPull(DepositNoPull {
                pool: engine.pool_key(),
                to: params.to,
                lp_tokens: params.lp_tokens,
                shares,
                timestamp: engine.clock.now,
            }));
            Ok(shares)
        })
    }

    /// Redeem the payer's shares for cfmm lp tokens
    pub fn withdraw_no_pull(&mut self, payer: &Pubkey, params: &WithdrawNoPullParams) -> Result<u64> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            require!(params.shares > 0, PositionError::ZeroAmount);
            let context = engine.relay_context(payer);
            engine.relay.open(context.clone());
            let assets =
                engine
                    .pool
                    .withdraw_no_pull(&mut engine.relay, &context, &params.to, params.shares);
            engine.relay.close();
            let assets = assets?;
            engine.events.push(LoanEvent::WithdrawNoPull(WithdrawNoPull {
                pool: engine.pool_key(),
                to: params.to,
                shares: params.shares,
                assets,
                timestamp: engine.clock.now,
            }));
            Ok(assets)
        })
    }

    pub fn deposit_reserves(
        &mut self,
        payer: &Pubkey,
        params: &DepositReservesParams,
    ) -> Result<ReservesMoved> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            let context = engine.relay_context(payer);
            engine.relay.open(context.clone());
            let moved = engine.pool.deposit_reserves(
                &mut engine.relay,
                &context,
                &params.to,
                &params.amounts_desired,
            );
            engine.relay.close();
            let moved = moved?;

            check_min_amounts(&moved.reserves, &params.amounts_min)?;
            engine.events.push(LoanEvent::DepositReserve(DepositReserve {
                pool: engine.pool_key(),
                to: params.to,
                reserves: moved.reserves.clone(),
                shares: moved.amount,
                timestamp: engine.clock.now,
            }));
            Ok(moved)
        })
    }

    /// Redeem the payer's shares for the pool's reserve tokens
    pub fn withdraw_reserves(
        &mut self,
        payer: &Pubkey,
        params: &WithdrawReservesParams,
    ) -> Result<ReservesMoved> {
        self.atomically(|engine| {
            engine.ensure_live(params.deadline)?;
            require!(params.shares > 0, PositionError::ZeroAmount);
            let context = engine.relay_context(payer);
            engine.relay.open(context.clone());
            let moved =
                engine
                    .pool
                    .withdraw_reserves(&mut engine.relay, &context, &params.to, params.shares);
            engine.relay.close();
            let moved = moved?;
            check_min_amounts(&moved.reserves, &params.amounts_min)?;
            engine.events.push(LoanEvent::WithdrawReserve(WithdrawReserve {
                pool: engine.pool_key(),
                to: params.to,
                reserves: moved.reserves.clone(),
                assets: moved.amount,
                timestamp: engine.clock.now,
            }));
            Ok(moved)
        })
    }

    // ------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------

    fn atomically<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let mark = self.events.len();
        self.store.checkpoint();
        self.relay.checkpoint();
        let result = op(self);
        if result.is_err() {
            self.events.truncate(mark);
            self.relay.close();
            self.relay.rollback();
            self.store.rollback();
        }
        result
    }

    fn ensure_live(&self, deadline: i64) -> Result<()> {
        require!(self.clock.now <= deadline, PositionError::Expired);
        Ok(())
    }

    fn pool_key(&self) -> Pubkey {
        self.pool.handle().address
    }

    fn relay_context(&self, payer: &Pubkey) -> RelayContext {
        let handle = self.pool.handle();
        RelayContext {
            protocol_id: handle.protocol_id,
            cfmm: handle.cfmm,
            payer: *payer,
        }
    }

    fn load_owned(&self, loan_id: u64, caller: &Pubkey) -> Result<Loan> {
        let loan = self.store.load(loan_id)?;
        require_keys_eq!(loan.pool, self.pool_key(), PositionError::PoolMismatch);
        require_keys_eq!(loan.owner, *caller, PositionError::NotLoanOwner);
        Ok(loan)
    }

    fn adopt_holdings(&self, loan: &mut Loan, tokens_held: Vec<u64>) -> Result<()> {
        require!(
            tokens_held.len() == self.pool.collateral_slots(),
            PositionError::InvalidCollateralSlots
        );
        loan.tokens_held = tokens_held;
        Ok(())
    }

    fn open_loan(&mut self, owner: &Pubkey, ref_id: u16) -> Result<Loan> {
        require_keys_neq!(*owner, Pubkey::default(), PositionError::ZeroAddress);
        let id = self.store.allocate_id(self.clock.round)?;
        let pool = self.pool_key();
        let loan = Loan::new(
            id,
            *owner,
            pool,
            self.pool.collateral_slots(),
            ref_id,
            self.clock.now,
        );
        self.events.push(LoanEvent::CreateLoan(CreateLoan {
            pool,
            owner: *owner,
            loan_id: id,
            ref_id,
            timestamp: self.clock.now,
        }));
        Ok(loan)
    }

    /// Insert a new loan and read back what the ledger stored
    fn register(&mut self, loan: Loan) -> Result<Loan> {
        let id = loan.id;
        self.store.insert(loan)?;
        self.store.load(id)
    }

    fn push_update(&mut self, loan: &Loan) {
        self.events
            .push(LoanEvent::LoanUpdate(LoanUpdate::snapshot(loan, self.clock.now)));
    }

    fn commit(&mut self, loan: &Loan) -> Result<()> {
        self.store.save(loan)?;
        self.push_update(loan);
        Ok(())
    }

    fn step_increase(&mut self, loan: &mut Loan, payer: &Pubkey, amounts: &[u64]) -> Result<()> {
        require!(
            amounts.len() <= loan.tokens_held.len(),
            PositionError::InvalidAmountsLength
        );
        let context = self.relay_context(payer);
        self.relay.open(context.clone());
        let held = self
            .pool
            .increase_collateral(&mut self.relay, &context, loan, amounts);
        self.relay.close();
        self.adopt_holdings(loan, held?)?;

        self.events.push(LoanEvent::IncreaseCollateral(IncreaseCollateral {
            pool: loan.pool,
            loan_id: loan.id,
            tokens_held: loan.tokens_held.clone(),
            amounts: amounts.to_vec(),
            timestamp: self.clock.now,
        }));
        Ok(())
    }

    fn step_decrease(&mut self, loan: &mut Loan, amounts: &[u64], to: &Pubkey) -> Result<()> {
        sub_amounts(&loan.tokens_held, amounts)?;
        let held = self.pool.decrease_collateral(loan, amounts, to)?;
        self.adopt_holdings(loan, held)?;

        self.events.push(LoanEvent::DecreaseCollateral(DecreaseCollateral {
            pool: loan.pool,
            loan_id: loan.id,
            tokens_held: loan.tokens_held.clone(),
            amounts: amounts.to_vec(),
            to: *to,
            timestamp: self.clock.now,
        }));
        Ok(())
    }

    fn step_borrow(
        &mut self,
        loan: &mut Loan,
        lp_tokens: u64,
        ratio: &[u64],
        min_borrowed: &[u64],
        max_borrowed: u128,
    ) -> Result<BorrowOutcome> {
        require!(lp_tokens > 0, PositionError::ZeroAmount);
        let outcome = self.pool.borrow_liquidity(loan, lp_tokens, ratio)?;
        loan.record_borrow(outcome.liquidity_borrowed, lp_tokens)?;
        require!(loan.liquidity <= max_borrowed, PositionError::MaxBorrowed);
        check_min_amounts(&outcome.amounts, min_borrowed)?;
        self.adopt_holdings(loan, outcome.tokens_held.clone())?;

        self.events.push(LoanEvent::BorrowLiquidity(BorrowLiquidity {
            pool: loan.pool,
            loan_id: loan.id,
            liquidity_borrowed: outcome.liquidity_borrowed,
            amounts: outcome.amounts.clone(),
            timestamp: self.clock.now,
        }));
        Ok(outcome)
    }

    /// Ratio mode wins over a literal liquidity amount when both are given
    fn step_repay(&mut self, loan: &mut Loan, step: RepayStep<'_>) -> Result<RepayOutcome> {
        let mode = if step.is_ratio {
            RepayMode::Ratio {
                ratio: step.ratio.to_vec(),
            }
        } else {
            require!(step.liquidity > 0, PositionError::ZeroAmount);
            RepayMode::Collateral {
                collateral_id: step.collateral_id,
                to: step.to,
            }
        };

        let outcome = self.pool.repay_liquidity(loan, step.liquidity, &mode)?;
        loan.record_repay(outcome.liquidity_paid)?;
        require!(
            meets_minimums(&outcome.amounts, step.min_repaid),
            PositionError::MinRepaid
        );
        self.adopt_holdings(loan, outcome.tokens_held.clone())?;

        let event = if step.is_ratio {
            LoanEvent::RepayLiquiditySetRatio(RepayLiquiditySetRatio {
                pool: loan.pool,
                loan_id: loan.id,
                liquidity_paid: outcome.liquidity_paid,
                amounts: outcome.amounts.clone(),
                ratio: step.ratio.to_vec(),
                timestamp: self.clock.now,
            })
        } else {
            LoanEvent::RepayLiquidity(RepayLiquidity {
                pool: loan.pool,
                loan_id: loan.id,
                liquidity_paid: outcome.liquidity_paid,
                amounts: outcome.amounts.clone(),
                timestamp: self.clock.now,
            })
        };
        self.events.push(event);
        Ok(outcome)
    }

    fn step_rebalance(&mut self, loan: &mut Loan, target: &RebalanceTarget) -> Result<()> {
        let held = self.pool.rebalance_collateral(loan, target)?;
        self.adopt_holdings(loan, held)?;
        self.events.push(LoanEvent::RebalanceCollateral(RebalanceCollateral {
            pool: loan.pool,
            loan_id: loan.id,
            tokens_held: loan.tokens_held.clone(),
            timestamp: self.clock.now,
        }));
        Ok(())
    }

    /// Hand custody to the rebalancer, call it, and read the loan back.
    ///
    /// A zero rebalancer returns the loan untouched: no hand-off, no call,
    /// no event.
    fn step_external<R: ExternalRebalancer>(
        &mut self,
        loan: Loan,
        rebalancer: &mut R,
        step: ExternalStep<'_>,
    ) -> Result<Loan> {
        if step.rebalancer == Pubkey::default() {
            return Ok(loan);
        }
        require_keys_eq!(
            rebalancer.key(),
            step.rebalancer,
            PositionError::InvalidRebalancer
        );
        sub_amounts(&loan.tokens_held, step.amounts)?;
        require!(
            step.lp_tokens <= loan.lp_tokens,
            PositionError::InsufficientCollateral
        );

        self.pool
            .release_to_rebalancer(&loan, step.amounts, step.lp_tokens, &step.rebalancer)?;
        self.store.save(&loan)?;

        rebalancer.external_call(&RebalanceRequest {
            loan_id: loan.id,
            pool: loan.pool,
            amounts: step.amounts.to_vec(),
            lp_tokens: step.lp_tokens,
            data: step.data.to_vec(),
        })?;

        // Nothing from before the call is reused past this point.
        let mut loan = self.store.load(loan.id)?;
        require_keys_eq!(loan.pool, self.pool_key(), PositionError::PoolMismatch);
        let settled = self.pool.settle_external_rebalance(&loan)?;
        self.adopt_holdings(&mut loan, settled.tokens_held)?;
        loan.liquidity = settled.loan_liquidity;

        self.events
            .push(LoanEvent::RebalanceCollateralExternally(RebalanceCollateralExternally {
                pool: loan.pool,
                loan_id: loan.id,
                rebalancer: step.rebalancer,
                loan_liquidity: loan.liquidity,
                tokens_held: loan.tokens_held.clone(),
                timestamp: self.clock.now,
            }));
        Ok(loan)
    }

    fn run_rebalance_repay_and_withdraw(
        &mut self,
        caller: &Pubkey,
        params: &RebalanceRepayAndWithdrawParams,
    ) -> Result<Loan> {
        self.ensure_live(params.deadline)?;
        let mut loan = self.load_owned(params.loan_id, caller)?;
        if let Some(target) = RebalanceTarget::from_parts(&params.deltas, &params.ratio) {
            self.step_rebalance(&mut loan, &target)?;
        }
        if params.is_ratio || params.liquidity > 0 {
            self.step_repay(
                &mut loan,
                RepayStep {
                    liquidity: params.liquidity,
                    collateral_id: params.collateral_id,
                    to: params.to,
                    is_ratio: params.is_ratio,
                    ratio: &params.repay_ratio,
                    min_repaid: &params.min_repaid,
                },
            )?;
        }
        // Empty skips both the withdrawal and its guard; explicit zeros
        // still run the guard.
        if !params.withdraw.is_empty() {
            self.step_decrease(&mut loan, &params.withdraw, &params.to)?;
            check_min_amounts(&loan.tokens_held, &params.min_collateral)?;
        }
        Ok(loan)
    }
}
