//! In-memory stand-ins for the engine's collaborators
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use anchor_lang::prelude::*;
use position_manager::custody::{CustodyRelay, RelayContext, TokenMover};
use position_manager::engine::{CallClock, LoanEngine};
use position_manager::errors::PositionError;
use position_manager::ledger::PositionStore;
use position_manager::math::{add_amounts, sub_amounts};
use position_manager::pool::*;
use position_manager::rebalancer::{ExternalRebalancer, RebalanceRequest};
use position_manager::resolver::{pool_address, pool_authority, PoolHandle};
use position_manager::state::{loan_address, IdAllocator, IndexSlot, Loan, LoanIndex};

pub const NOW: i64 = 1_700_000_000;
pub const ROUND: u64 = 42;

pub type TestEngine = LoanEngine<MemoryStore, MockPool, MemoryTokens>;

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct Ledger {
    pub allocator: IdAllocator,
    pub sequence: u64,
    pub loans: BTreeMap<u64, Loan>,
    pub by_owner: HashMap<Pubkey, LoanIndex>,
    pub by_owner_pool: HashMap<(Pubkey, Pubkey), LoanIndex>,
}

impl Ledger {
    fn append(&mut self, owner: Pubkey, loan: &Loan) {
        let key = loan_address(loan.sequence);
        self.by_owner
            .entry(owner)
            .or_insert_with(|| LoanIndex::new(owner, Pubkey::default()))
            .append(loan.id, key);
        self.by_owner_pool
            .entry((owner, loan.pool))
            .or_insert_with(|| LoanIndex::new(owner, loan.pool))
            .append(loan.id, key);
    }
}

/// Shared so a rebalancer can re-enter the ledger mid-call
#[derive(Clone, Default)]
pub struct MemoryStore {
    ledger: Rc<RefCell<Ledger>>,
    saved: Rc<RefCell<Option<Ledger>>>,
}

impl MemoryStore {
    pub fn ledger(&self) -> std::cell::Ref<'_, Ledger> {
        self.ledger.borrow()
    }

    pub fn loan(&self, loan_id: u64) -> Option<Loan> {
        self.ledger.borrow().loans.get(&loan_id).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<u64, Loan> {
        self.ledger.borrow().loans.clone()
    }

    pub fn by_owner(&self, owner: &Pubkey, offset: u64, limit: u64) -> Vec<IndexSlot> {
        self.ledger
            .borrow()
            .by_owner
            .get(owner)
            .map(|index| index.page(offset, limit))
            .unwrap_or_default()
    }

    pub fn by_owner_and_pool(
        &self,
        owner: &Pubkey,
        pool: &Pubkey,
        offset: u64,
        limit: u64,
    ) -> Vec<IndexSlot> {
        self.ledger
            .borrow()
            .by_owner_pool
            .get(&(*owner, *pool))
            .map(|index| index.page(offset, limit))
            .unwrap_or_default()
    }
}

impl PositionStore for MemoryStore {
    fn allocate_id(&mut self, round: u64) -> Result<u64> {
        self.ledger.borrow_mut().allocator.next_id(round)
    }

    fn insert(&mut self, mut loan: Loan) -> Result<()> {
        let mut ledger = self.ledger.borrow_mut();
        loan.sequence = ledger.sequence;
        ledger.sequence += 1;
        ledger.append(loan.owner, &loan);
        ledger.loans.insert(loan.id, loan);
        Ok(())
    }

    fn load(&self, loan_id: u64) -> Result<Loan> {
        self.loan(loan_id)
            .ok_or_else(|| PositionError::UnknownPosition.into())
    }

    fn save(&mut self, loan: &Loan) -> Result<()> {
        let mut ledger = self.ledger.borrow_mut();
        let stored = ledger
            .loans
            .get_mut(&loan.id)
            .ok_or(PositionError::UnknownPosition)?;
        *stored = loan.clone();
        Ok(())
    }

    fn reassign(&mut self, loan: &Loan, new_owner: &Pubkey) -> Result<()> {
        let mut ledger = self.ledger.borrow_mut();
        ledger
            .by_owner
            .get_mut(&loan.owner)
            .ok_or(PositionError::UnknownPosition)?
            .tombstone(loan.id)?;
        ledger
            .by_owner_pool
            .get_mut(&(loan.owner, loan.pool))
            .ok_or(PositionError::UnknownPosition)?
            .tombstone(loan.id)?;
        ledger.append(*new_owner, loan);
        Ok(())
    }

    fn checkpoint(&mut self) {
        *self.saved.borrow_mut() = Some(self.ledger.borrow().clone());
    }

    fn rollback(&mut self) {
        if let Some(saved) = self.saved.borrow_mut().take() {
            *self.ledger.borrow_mut() = saved;
        }
    }
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

type Move = (Pubkey, Pubkey, Pubkey, u64);

/// Balances keyed by (mint, owner)
#[derive(Default)]
pub struct MemoryTokens {
    pub balances: HashMap<(Pubkey, Pubkey), u64>,
    pub moves: Vec<Move>,
    saved: Option<(HashMap<(Pubkey, Pubkey), u64>, Vec<Move>)>,
}

impl MemoryTokens {
    pub fn fund(&mut self, mint: Pubkey, owner: Pubkey, amount: u64) {
        *self.balances.entry((mint, owner)).or_default() += amount;
    }

    pub fn balance(&self, mint: &Pubkey, owner: &Pubkey) -> u64 {
        self.balances.get(&(*mint, *owner)).copied().unwrap_or(0)
    }
}

impl TokenMover for MemoryTokens {
    fn move_tokens(&mut self, mint: &Pubkey, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()> {
        let source = self
            .balances
            .get_mut(&(*mint, *from))
            .ok_or(PositionError::TokenAccountNotFound)?;
        *source = source
            .checked_sub(amount)
            .ok_or(PositionError::InsufficientCollateral)?;
        self.fund(*mint, *to, amount);
        self.moves.push((*mint, *from, *to, amount));
        Ok(())
    }

    fn checkpoint(&mut self) {
        self.saved = Some((self.balances.clone(), self.moves.clone()));
    }

    fn rollback(&mut self) {
        if let Some((balances, moves)) = self.saved.take() {
            self.balances = balances;
            self.moves = moves;
        }
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// What the pool has seen, shared with rebalancers that return collateral
#[derive(Default)]
pub struct PoolState {
    pub calls: Vec<&'static str>,
    pub released: Vec<u64>,
    pub released_lp: u64,
    pub returned: Vec<u64>,
}

/// Two-asset pool with deliberately simple pricing:
/// `lp_tokens` borrow `2 * lp_tokens` liquidity paid out as `lp_tokens` of
/// each asset, and repaying `x` liquidity costs `x / 2` of each asset.
pub struct MockPool {
    pub handle: PoolHandle,
    pub slots: usize,
    pub state: Rc<RefCell<PoolState>>,
}

impl MockPool {
    pub fn new(slots: usize) -> Self {
        let cfmm = Pubkey::new_unique();
        let (address, _) = pool_address(1, &cfmm);
        Self {
            handle: PoolHandle {
                address,
                protocol_id: 1,
                cfmm,
                tokens: vec![Pubkey::new_unique(), Pubkey::new_unique()],
                pool_program: Pubkey::new_unique(),
            },
            slots,
            state: Rc::default(),
        }
    }

    pub fn custodian(&self) -> Pubkey {
        pool_authority(&self.handle.address, &self.handle.pool_program).0
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.borrow().calls.clone()
    }

    fn pull_shares<M: TokenMover>(
        &self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        shares: u64,
    ) -> Result<()> {
        relay.send_tokens(
            &self.handle.address,
            context,
            &[self.handle.share_mint()],
            &[shares],
            &self.custodian(),
        )
    }

    fn record(&self, call: &'static str) {
        self.state.borrow_mut().calls.push(call);
    }

    fn pad(&self, held: Vec<u64>) -> Vec<u64> {
        let mut held = held;
        held.resize(self.slots, 0);
        held
    }

    /// Redistribute the pool assets' share of `held` by `ratio`
    fn to_ratio(&self, held: &[u64], ratio: &[u64]) -> Vec<u64> {
        let assets = self.handle.tokens.len();
        let total: u64 = held.iter().take(assets).sum();
        let weight: u64 = ratio.iter().take(assets).sum();
        let mut out = held.to_vec();
        if weight == 0 {
            return out;
        }
        let mut assigned = 0;
        for i in 0..assets {
            let share = total * ratio.get(i).copied().unwrap_or(0) / weight;
            out[i] = share;
            assigned += share;
        }
        out[0] += total - assigned;
        out
    }
}

impl LiquidityPool for MockPool {
    fn handle(&self) -> &PoolHandle {
        &self.handle
    }

    fn collateral_slots(&self) -> usize {
        self.slots
    }

    fn deposit_no_pull<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        _to: &Pubkey,
        lp_tokens: u64,
    ) -> Result<u64> {
        self.record("deposit_no_pull");
        let custodian = self.custodian();
        relay.send_tokens(
            &self.handle.address,
            context,
            &[self.handle.cfmm],
            &[lp_tokens],
            &custodian,
        )?;
        Ok(lp_tokens)
    }

    fn withdraw_no_pull<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        _to: &Pubkey,
        shares: u64,
    ) -> Result<u64> {
        self.record("withdraw_no_pull");
        self.pull_shares(relay, context, shares)?;
        Ok(shares)
    }

    fn deposit_reserves<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        _to: &Pubkey,
        amounts_desired: &[u64],
    ) -> Result<ReservesMoved> {
        self.record("deposit_reserves");
        let custodian = self.custodian();
        relay.send_tokens(
            &self.handle.address,
            context,
            &self.handle.tokens,
            amounts_desired,
            &custodian,
        )?;
        Ok(ReservesMoved {
            reserves: amounts_desired.to_vec(),
            amount: amounts_desired.iter().sum(),
        })
    }

    fn withdraw_reserves<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        _to: &Pubkey,
        shares: u64,
    ) -> Result<ReservesMoved> {
        self.record("withdraw_reserves");
        self.pull_shares(relay, context, shares)?;
        Ok(ReservesMoved {
            reserves: vec![shares / 2, shares / 2],
            amount: shares,
        })
    }

    fn increase_collateral<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        loan: &Loan,
        amounts: &[u64],
    ) -> Result<Vec<u64>> {
        self.record("increase_collateral");
        let custodian = self.custodian();
        relay.send_tokens(&self.handle.address, context, &self.handle.tokens, amounts, &custodian)?;
        Ok(self.pad(add_amounts(&loan.tokens_held, amounts)?))
    }

    fn decrease_collateral(&mut self, loan: &Loan, amounts: &[u64], _to: &Pubkey) -> Result<Vec<u64>> {
        self.record("decrease_collateral");
        sub_amounts(&loan.tokens_held, amounts)
    }

    fn borrow_liquidity(&mut self, loan: &Loan, lp_tokens: u64, ratio: &[u64]) -> Result<BorrowOutcome> {
        self.record("borrow_liquidity");
        let amounts = vec![lp_tokens, lp_tokens];
        let mut held = self.pad(add_amounts(&loan.tokens_held, &amounts)?);
        if !ratio.is_empty() {
            held = self.to_ratio(&held, ratio);
        }
        Ok(BorrowOutcome {
            liquidity_borrowed: 2 * lp_tokens as u128,
            amounts,
            tokens_held: held,
        })
    }

    fn repay_liquidity(&mut self, loan: &Loan, liquidity: u128, mode: &RepayMode) -> Result<RepayOutcome> {
        self.record("repay_liquidity");
        let paid = match mode {
            RepayMode::Collateral { .. } => liquidity.min(loan.liquidity),
            RepayMode::Ratio { .. } => loan.liquidity,
        };
        let half = (paid / 2) as u64;
        let amounts = vec![half, half];
        let mut held = sub_amounts(&loan.tokens_held, &amounts)?;
        if let RepayMode::Ratio { ratio } = mode {
            if !ratio.is_empty() {
                held = self.to_ratio(&held, ratio);
            }
        }
        Ok(RepayOutcome {
            liquidity_paid: paid,
            amounts,
            tokens_held: held,
        })
    }

    fn repay_liquidity_with_lp<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        loan: &Loan,
        lp_tokens: u64,
        _collateral_id: u8,
        _to: &Pubkey,
    ) -> Result<RepayOutcome> {
        self.record("repay_liquidity_with_lp");
        let custodian = self.custodian();
        relay.send_tokens(
            &self.handle.address,
            context,
            &[self.handle.cfmm],
            &[lp_tokens],
            &custodian,
        )?;
        Ok(RepayOutcome {
            liquidity_paid: (2 * lp_tokens as u128).min(loan.liquidity),
            amounts: vec![],
            tokens_held: loan.tokens_held.clone(),
        })
    }

    fn rebalance_collateral(&mut self, loan: &Loan, target: &RebalanceTarget) -> Result<Vec<u64>> {
        self.record("rebalance_collateral");
        match target {
            RebalanceTarget::Ratio { ratio } => Ok(self.to_ratio(&loan.tokens_held, ratio)),
            RebalanceTarget::Deltas { deltas } => loan
                .tokens_held
                .iter()
                .enumerate()
                .map(|(i, held)| {
                    let delta = deltas.get(i).copied().unwrap_or(0);
                    held.checked_add_signed(delta)
                        .ok_or_else(|| PositionError::InsufficientCollateral.into())
                })
                .collect(),
        }
    }

    fn release_to_rebalancer(
        &mut self,
        _loan: &Loan,
        amounts: &[u64],
        lp_tokens: u64,
        _rebalancer: &Pubkey,
    ) -> Result<()> {
        self.record("release_to_rebalancer");
        let mut state = self.state.borrow_mut();
        state.released = amounts.to_vec();
        state.released_lp = lp_tokens;
        state.returned.clear();
        Ok(())
    }

    fn settle_external_rebalance(&mut self, loan: &Loan) -> Result<ExternalSettlement> {
        self.record("settle_external_rebalance");
        let state = self.state.borrow();
        let held = sub_amounts(&loan.tokens_held, &state.released)?;
        Ok(ExternalSettlement {
            tokens_held: add_amounts(&held, &state.returned)?,
            loan_liquidity: loan.liquidity,
        })
    }
}

// ---------------------------------------------------------------------------
// Rebalancer
// ---------------------------------------------------------------------------

type Reentry = Box<dyn FnMut(&mut Loan)>;

/// Hands back `returns` to the pool and optionally re-enters the ledger
pub struct ScriptedRebalancer {
    pub key: Pubkey,
    pub pool: Rc<RefCell<PoolState>>,
    pub returns: Vec<u64>,
    pub store: Option<MemoryStore>,
    pub reentry: Option<Reentry>,
    pub requests: Vec<RebalanceRequest>,
}

impl ScriptedRebalancer {
    pub fn new(pool: &MockPool, returns: Vec<u64>) -> Self {
        Self {
            key: Pubkey::new_unique(),
            pool: pool.state.clone(),
            returns,
            store: None,
            reentry: None,
            requests: Vec::new(),
        }
    }

    pub fn reentering(mut self, store: MemoryStore, reentry: impl FnMut(&mut Loan) + 'static) -> Self {
        self.store = Some(store);
        self.reentry = Some(Box::new(reentry));
        self
    }
}

impl ExternalRebalancer for ScriptedRebalancer {
    fn key(&self) -> Pubkey {
        self.key
    }

    fn external_call(&mut self, request: &RebalanceRequest) -> Result<()> {
        self.requests.push(request.clone());
        self.pool.borrow_mut().returned = self.returns.clone();

        if let (Some(store), Some(reentry)) = (self.store.as_mut(), self.reentry.as_mut()) {
            let mut loan = store.load(request.loan_id)?;
            reentry(&mut loan);
            store.save(&loan)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub struct Harness {
    pub engine: TestEngine,
    pub store: MemoryStore,
    pub pool_state: Rc<RefCell<PoolState>>,
    pub handle: PoolHandle,
    pub owner: Pubkey,
}

impl Harness {
    pub fn new(slots: usize) -> Self {
        let store = MemoryStore::default();
        let pool = MockPool::new(slots);
        let owner = Pubkey::new_unique();

        let mut tokens = MemoryTokens::default();
        let share_mint = pool.handle.share_mint();
        for mint in pool.handle.tokens.iter().chain([&pool.handle.cfmm, &share_mint]) {
            tokens.fund(*mint, owner, 1_000_000);
        }

        let pool_state = pool.state.clone();
        let handle = pool.handle.clone();
        let engine = LoanEngine::new(
            store.clone(),
            pool,
            CustodyRelay::new(tokens),
            CallClock { now: NOW, round: ROUND },
        );
        Self {
            engine,
            store,
            pool_state,
            handle,
            owner,
        }
    }

    pub fn two_asset() -> Self {
        Self::new(2)
    }

    pub fn open_loan(&mut self) -> u64 {
        let owner = self.owner;
        self.engine.create_loan(&owner, 0, NOW).unwrap().loan_id
    }

    pub fn custodian(&self) -> Pubkey {
        pool_authority(&self.handle.address, &self.handle.pool_program).0
    }

    pub fn loan(&self, loan_id: u64) -> Loan {
        self.store.loan(loan_id).unwrap()
    }

    /// Open a loan holding `amounts` of collateral
    pub fn funded_loan(&mut self, amounts: Vec<u64>) -> u64 {
        let loan_id = self.open_loan();
        let owner = self.owner;
        self.engine
            .increase_collateral(
                &owner,
                &position_manager::params::CollateralParams {
                    loan_id,
                    amounts,
                    deadline: NOW,
                    ..Default::default()
                },
            )
            .unwrap();
        self.engine.take_events();
        loan_id
    }

    /// `funded_loan` followed by a borrow of `lp_tokens`
    pub fn borrowed_loan(&mut self, amounts: Vec<u64>, lp_tokens: u64) -> u64 {
        let loan_id = self.funded_loan(amounts);
        let owner = self.owner;
        self.engine
            .borrow_liquidity(
                &owner,
                &position_manager::params::BorrowLiquidityParams {
                    loan_id,
                    lp_tokens,
                    max_borrowed: u128::MAX,
                    deadline: NOW,
                    ..Default::default()
                },
            )
            .unwrap();
        self.engine.take_events();
        loan_id
    }

    pub fn rebalancer(&self, returns: Vec<u64>) -> ScriptedRebalancer {
        ScriptedRebalancer::new(self.engine.pool(), returns)
    }

    pub fn balance(&self, mint: &Pubkey, owner: &Pubkey) -> u64 {
        self.engine.relay().mover().balance(mint, owner)
    }

    pub fn event_names(&mut self) -> Vec<&'static str> {
        self.engine.take_events().iter().map(|event| event.name()).collect()
    }
}
