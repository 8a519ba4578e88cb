//! Pool collaborator interface and its CPI implementation

use anchor_lang::prelude::*;
use anchor_lang::solana_program::hash::hash;
use anchor_lang::solana_program::program::{get_return_data, invoke_signed};
use solana_program::instruction::{AccountMeta, Instruction};

use crate::constants::MANAGER_AUTHORITY_SEED;
use crate::custody::{CustodyRelay, RelayContext, TokenMover};
use crate::errors::PositionError;
use crate::resolver::{pool_authority, PoolHandle};
use crate::state::Loan;

/// How a repayment is sized
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum RepayMode {
    /// Repay up to a literal liquidity amount; `collateral_id` names the
    /// asset the pool pays out any remainder in, sent to `to`.
    Collateral { collateral_id: u8, to: Pubkey },
    /// Repay from held collateral, split by `ratio`
    Ratio { ratio: Vec<u64> },
}

/// How held collateral is swapped in place
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub enum RebalanceTarget {
    Deltas { deltas: Vec<i64> },
    Ratio { ratio: Vec<u64> },
}

impl RebalanceTarget {
    /// A non-empty ratio wins over deltas; nothing given means no rebalance.
    pub fn from_parts(deltas: &[i64], ratio: &[u64]) -> Option<Self> {
        if !ratio.is_empty() {
            Some(Self::Ratio { ratio: ratio.to_vec() })
        } else if !deltas.is_empty() {
            Some(Self::Deltas { deltas: deltas.to_vec() })
        } else {
            None
        }
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BorrowOutcome {
    pub liquidity_borrowed: u128,
    pub amounts: Vec<u64>,
    pub tokens_held: Vec<u64>,
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RepayOutcome {
    pub liquidity_paid: u128,
    pub amounts: Vec<u64>,
    pub tokens_held: Vec<u64>,
}

/// Reserves moved by a deposit or withdrawal and the shares minted or
/// assets returned alongside.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReservesMoved {
    pub reserves: Vec<u64>,
    pub amount: u64,
}

/// Loan state as the pool sees it once a rebalancer has returned
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalSettlement {
    pub tokens_held: Vec<u64>,
    pub loan_liquidity: u128,
}

/// The slice of a loan a pool needs to act on it
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LoanView {
    pub loan_id: u64,
    pub tokens_held: Vec<u64>,
    pub liquidity: u128,
    pub lp_tokens: u64,
}

impl From<&Loan> for LoanView {
    fn from(loan: &Loan) -> Self {
        Self {
            loan_id: loan.id,
            tokens_held: loan.tokens_held.clone(),
            liquidity: loan.liquidity,
            lp_tokens: loan.lp_tokens,
        }
    }
}

/// Primitives the lifecycle engine drives on a resolved pool.
///
/// Calls that need tokens from the caller receive the relay and the
/// in-flight context; the pool passes the context back when it pulls.
pub trait LiquidityPool {
    fn handle(&self) -> &PoolHandle;

    /// Length of every loan's `tokens_held` on this pool
    fn collateral_slots(&self) -> usize {
        self.handle().tokens.len()
    }

    /// Pulls `lp_tokens` of the cfmm from the payer, returns shares minted
    fn deposit_no_pull<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        to: &Pubkey,
        lp_tokens: u64,
    ) -> Result<u64>;

    /// Pulls `shares` from the payer, returns the cfmm lp tokens released
    fn withdraw_no_pull<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        to: &Pubkey,
        shares: u64,
    ) -> Result<u64>;

    fn deposit_reserves<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        to: &Pubkey,
        amounts_desired: &[u64],
    ) -> Result<ReservesMoved>;

    fn withdraw_reserves<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        to: &Pubkey,
        shares: u64,
    ) -> Result<ReservesMoved>;

    /// Returns the loan's holdings after the deposit
    fn increase_collateral<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        loan: &Loan,
        amounts: &[u64],
    ) -> Result<Vec<u64>>;

    fn decrease_collateral(&mut self, loan: &Loan, amounts: &[u64], to: &Pubkey) -> Result<Vec<u64>>;

    fn borrow_liquidity(&mut self, loan: &Loan, lp_tokens: u64, ratio: &[u64]) -> Result<BorrowOutcome>;

    fn repay_liquidity(&mut self, loan: &Loan, liquidity: u128, mode: &RepayMode) -> Result<RepayOutcome>;

    fn repay_liquidity_with_lp<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        loan: &Loan,
        lp_tokens: u64,
        collateral_id: u8,
        to: &Pubkey,
    ) -> Result<RepayOutcome>;

    fn rebalance_collateral(&mut self, loan: &Loan, target: &RebalanceTarget) -> Result<Vec<u64>>;

    /// Move collateral and shares into the rebalancer's custody
    fn release_to_rebalancer(
        &mut self,
        loan: &Loan,
        amounts: &[u64],
        lp_tokens: u64,
        rebalancer: &Pubkey,
    ) -> Result<()>;

    /// Re-price the loan once the rebalancer has returned
    fn settle_external_rebalance(&mut self, loan: &Loan) -> Result<ExternalSettlement>;
}

impl<P: LiquidityPool + ?Sized> LiquidityPool for &mut P {
    fn handle(&self) -> &PoolHandle {
        (**self).handle()
    }

    fn collateral_slots(&self) -> usize {
        (**self).collateral_slots()
    }

    fn deposit_no_pull<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        to: &Pubkey,
        lp_tokens: u64,
    ) -> Result<u64> {
        (**self).deposit_no_pull(relay, context, to, lp_tokens)
    }

    fn withdraw_no_pull<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        to: &Pubkey,
        shares: u64,
    ) -> Result<u64> {
        (**self).withdraw_no_pull(relay, context, to, shares)
    }

    fn deposit_reserves<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        to: &Pubkey,
        amounts_desired: &[u64],
    ) -> Result<ReservesMoved> {
        (**self).deposit_reserves(relay, context, to, amounts_desired)
    }

    fn withdraw_reserves<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        to: &Pubkey,
        shares: u64,
    ) -> Result<ReservesMoved> {
        (**self).withdraw_reserves(relay, context, to, shares)
    }

    fn increase_collateral<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        loan: &Loan,
        amounts: &[u64],
    ) -> Result<Vec<u64>> {
        (**self).increase_collateral(relay, context, loan, amounts)
    }

    fn decrease_collateral(&mut self, loan: &Loan, amounts: &[u64], to: &Pubkey) -> Result<Vec<u64>> {
        (**self).decrease_collateral(loan, amounts, to)
    }

    fn borrow_liquidity(&mut self, loan: &Loan, lp_tokens: u64, ratio: &[u64]) -> Result<BorrowOutcome> {
        (**self).borrow_liquidity(loan, lp_tokens, ratio)
    }

    fn repay_liquidity(&mut self, loan: &Loan, liquidity: u128, mode: &RepayMode) -> Result<RepayOutcome> {
        (**self).repay_liquidity(loan, liquidity, mode)
    }

    fn repay_liquidity_with_lp<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        loan: &Loan,
        lp_tokens: u64,
        collateral_id: u8,
        to: &Pubkey,
    ) -> Result<RepayOutcome> {
        (**self).repay_liquidity_with_lp(relay, context, loan, lp_tokens, collateral_id, to)
    }

    fn rebalance_collateral(&mut self, loan: &Loan, target: &RebalanceTarget) -> Result<Vec<u64>> {
        (**self).rebalance_collateral(loan, target)
    }

    fn release_to_rebalancer(
        &mut self,
        loan: &Loan,
        amounts: &[u64],
        lp_tokens: u64,
        rebalancer: &Pubkey,
    ) -> Result<()> {
        (**self).release_to_rebalancer(loan, amounts, lp_tokens, rebalancer)
    }

    fn settle_external_rebalance(&mut self, loan: &Loan) -> Result<ExternalSettlement> {
        (**self).settle_external_rebalance(loan)
    }
}

/// Anchor instruction discriminator: `sha256("global:<name>")[..8]`
pub fn instruction_discriminator(name: &str) -> [u8; 8] {
    let preimage = format!("global:{name}");
    let mut discriminator = [0u8; 8];
    discriminator.copy_from_slice(&hash(preimage.as_bytes()).to_bytes()[..8]);
    discriminator
}

/// Executes pool primitives by invoking the registered pool program,
/// signed by the manager authority PDA.
///
/// Every call passes the pool record and the manager authority first,
/// followed by the forwarded remaining accounts. Results come back as
/// return data.
pub struct CpiPool<'info> {
    handle: PoolHandle,
    pool: AccountInfo<'info>,
    pool_program: AccountInfo<'info>,
    authority: AccountInfo<'info>,
    authority_bump: u8,
    accounts: Vec<AccountInfo<'info>>,
}

impl<'info> CpiPool<'info> {
    pub fn new(
        handle: PoolHandle,
        pool: AccountInfo<'info>,
        pool_program: AccountInfo<'info>,
        authority: AccountInfo<'info>,
        authority_bump: u8,
        accounts: &[AccountInfo<'info>],
    ) -> Result<Self> {
        require_keys_eq!(
            *pool_program.key,
            handle.pool_program,
            PositionError::PoolNotFound
        );
        Ok(Self {
            handle,
            pool,
            pool_program,
            authority,
            authority_bump,
            accounts: accounts.to_vec(),
        })
    }

    fn invoke<A: AnchorSerialize>(&self, name: &str, args: &A) -> Result<()> {
        let mut data = instruction_discriminator(name).to_vec();
        args.serialize(&mut data)
            .map_err(|_| error!(PositionError::PoolResponseInvalid))?;

        let mut metas = vec![
            AccountMeta::new_readonly(*self.pool.key, false),
            AccountMeta::new_readonly(*self.authority.key, true),
        ];
        metas.extend(self.accounts.iter().map(|info| {
            if info.is_writable {
                AccountMeta::new(*info.key, info.is_signer)
            } else {
                AccountMeta::new_readonly(*info.key, info.is_signer)
            }
        }));

        let mut infos = vec![self.pool.clone(), self.authority.clone()];
        infos.extend(self.accounts.iter().cloned());
        infos.push(self.pool_program.clone());

        let ix = Instruction {
            program_id: *self.pool_program.key,
            accounts: metas,
            data,
        };
        let seeds = &[MANAGER_AUTHORITY_SEED, &[self.authority_bump]];
        invoke_signed(&ix, &infos, &[&seeds[..]])?;
        Ok(())
    }

    fn call<A: AnchorSerialize, R: AnchorDeserialize>(&self, name: &str, args: &A) -> Result<R> {
        self.invoke(name, args)?;
        let (program_id, data) =
            get_return_data().ok_or(PositionError::PoolResponseInvalid)?;
        require_keys_eq!(
            program_id,
            *self.pool_program.key,
            PositionError::PoolResponseInvalid
        );
        R::deserialize(&mut &data[..]).map_err(|_| error!(PositionError::PoolResponseInvalid))
    }

    fn pull<M: TokenMover>(
        &self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        tokens: &[Pubkey],
        amounts: &[u64],
    ) -> Result<()> {
        relay.send_tokens(&self.handle.address, context, tokens, amounts, &self.custodian())
    }

    /// Owner of the pool's token vaults
    pub fn custodian(&self) -> Pubkey {
        pool_authority(&self.handle.address, &self.handle.pool_program).0
    }
}

impl<'info> LiquidityPool for CpiPool<'info> {
    fn handle(&self) -> &PoolHandle {
        &self.handle
    }

    fn deposit_no_pull<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        to: &Pubkey,
        lp_tokens: u64,
    ) -> Result<u64> {
        let cfmm = self.handle.cfmm;
        self.pull(relay, context, &[cfmm], &[lp_tokens])?;
        self.call("deposit_no_pull", &(*to, lp_tokens))
    }

    fn withdraw_no_pull<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        to: &Pubkey,
        shares: u64,
    ) -> Result<u64> {
        let share_mint = self.handle.share_mint();
        self.pull(relay, context, &[share_mint], &[shares])?;
        self.call("withdraw_no_pull", &(*to, shares))
    }

    fn deposit_reserves<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        to: &Pubkey,
        amounts_desired: &[u64],
    ) -> Result<ReservesMoved> {
        let tokens = self.handle.tokens.clone();
        self.pull(relay, context, &tokens, amounts_desired)?;
        self.call("deposit_reserves", &(*to, amounts_desired.to_vec()))
    }

    fn withdraw_reserves<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        to: &Pubkey,
        shares: u64,
    ) -> Result<ReservesMoved> {
        let share_mint = self.handle.share_mint();
        self.pull(relay, context, &[share_mint], &[shares])?;
        self.call("withdraw_reserves", &(*to, shares))
    }

    fn increase_collateral<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        loan: &Loan,
        amounts: &[u64],
    ) -> Result<Vec<u64>> {
        let tokens = self.handle.tokens.clone();
        self.pull(relay, context, &tokens, amounts)?;
        self.call("increase_collateral", &(LoanView::from(loan), amounts.to_vec()))
    }

    fn decrease_collateral(&mut self, loan: &Loan, amounts: &[u64], to: &Pubkey) -> Result<Vec<u64>> {
        self.call("decrease_collateral", &(LoanView::from(loan), amounts.to_vec(), *to))
    }

    fn borrow_liquidity(&mut self, loan: &Loan, lp_tokens: u64, ratio: &[u64]) -> Result<BorrowOutcome> {
        self.call("borrow_liquidity", &(LoanView::from(loan), lp_tokens, ratio.to_vec()))
    }

    fn repay_liquidity(&mut self, loan: &Loan, liquidity: u128, mode: &RepayMode) -> Result<RepayOutcome> {
        self.call("repay_liquidity", &(LoanView::from(loan), liquidity, mode.clone()))
    }

    fn repay_liquidity_with_lp<M: TokenMover>(
        &mut self,
        relay: &mut CustodyRelay<M>,
        context: &RelayContext,
        loan: &Loan,
        lp_tokens: u64,
        collateral_id: u8,
        to: &Pubkey,
    ) -> Result<RepayOutcome> {
        let cfmm = self.handle.cfmm;
        self.pull(relay, context, &[cfmm], &[lp_tokens])?;
        self.call(
            "repay_liquidity_with_lp",
            &(LoanView::from(loan), lp_tokens, collateral_id, *to),
        )
    }

    fn rebalance_collateral(&mut self, loan: &Loan, target: &RebalanceTarget) -> Result<Vec<u64>> {
        self.call("rebalance_collateral", &(LoanView::from(loan), target.clone()))
    }

    fn release_to_rebalancer(
        &mut self,
        loan: &Loan,
        amounts: &[u64],
        lp_tokens: u64,
        rebalancer: &Pubkey,
    ) -> Result<()> {
        self.invoke(
            "release_to_rebalancer",
            &(LoanView::from(loan), amounts.to_vec(), lp_tokens, *rebalancer),
        )
    }

    fn settle_external_rebalance(&mut self, loan: &Loan) -> Result<ExternalSettlement> {
        self.call("settle_external_rebalance", &LoanView::from(loan))
    }
}
