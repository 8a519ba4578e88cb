use anchor_lang::prelude::*;
use anchor_spl::token::Token;
use crate::constants::*;
use crate::custody::{CustodyRelay, SplTokenMover};
use crate::engine::{CallClock, LoanEngine, LoanReceipt};
use crate::events::emit_all;
use crate::ledger::{AccountStore, IndexPair, RentPayer};
use crate::params::*;
use crate::pool::CpiPool;
use crate::rebalancer::CpiRebalancer;
use crate::resolver::resolve_account;
use crate::state::*;

pub type ChainEngine<'a, 'info> =
    LoanEngine<AccountStore<'a, 'info>, CpiPool<'info>, SplTokenMover<'info>>;

/// Open a loan for `owner` on a pool
///
/// The loan account is the next one in the manager's loan sequence. Both
/// owner indices are created on first use and grown as needed.
#[derive(Accounts)]
#[instruction(owner: Pubkey)]
pub struct NewLoan<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,

    #[account(
        mut,
        seeds = [CONFIG_SEED],
        bump = config.bump
    )]
    pub config: Account<'info, ManagerConfig>,

    /// CHECK: Resolved to a pool record in the handler
    pub pool: UncheckedAccount<'info>,

    #[account(
        init,
        payer = payer,
        space = Loan::space(MAX_POOL_TOKENS),
        seeds = [LOAN_SEED, &config.loans_created.to_le_bytes()],
        bump
    )]
    pub loan: Account<'info, Loan>,

    #[account(
        init_if_needed,
        payer = payer,
        space = LoanIndex::space(INDEX_INITIAL_SLOTS),
        seeds = [OWNER_INDEX_SEED, owner.as_ref()],
        bump
    )]
    pub owner_index: Account<'info, LoanIndex>,

    #[account(
        init_if_needed,
        payer = payer,
        space = LoanIndex::space(INDEX_INITIAL_SLOTS),
        seeds = [OWNER_POOL_INDEX_SEED, owner.as_ref(), pool.key().as_ref()],
        bump
    )]
    pub owner_pool_index: Account<'info, LoanIndex>,

    /// CHECK: Signs pool and rebalancer CPIs, validated by seeds
    #[account(
        seeds = [MANAGER_AUTHORITY_SEED],
        bump = config.authority_bump
    )]
    pub manager_authority: UncheckedAccount<'info>,

    /// CHECK: Relay delegate, validated by seeds
    #[account(
        seeds = [RELAY_SEED],
        bump = config.relay_bump
    )]
    pub relay_authority: UncheckedAccount<'info>,

    /// CHECK: Compared with the program stored in the pool record
    pub pool_program: UncheckedAccount<'info>,

    /// CHECK: External rebalancer program, matched against the parameters
    pub rebalancer: Option<UncheckedAccount<'info>>,

    pub token_program: Program<'info, Token>,

    pub system_program: Program<'info, System>,
}

impl<'info> NewLoan<'info> {
    pub fn rebalancer(&self, remaining: &[AccountInfo<'info>]) -> CpiRebalancer<'info> {
        CpiRebalancer::new(
            self.rebalancer.as_ref().map(|program| program.to_account_info()),
            self.manager_authority.to_account_info(),
            self.config.authority_bump,
            remaining,
        )
    }

    pub fn engine<'a>(
        &'a mut self,
        bumps: &NewLoanBumps,
        remaining: &[AccountInfo<'info>],
    ) -> Result<ChainEngine<'a, 'info>> {
        let handle = resolve_account(&self.pool.to_account_info())?;
        let pool = CpiPool::new(
            handle,
            self.pool.to_account_info(),
            self.pool_program.to_account_info(),
            self.manager_authority.to_account_info(),
            self.config.authority_bump,
            remaining,
        )?;
        let mover = SplTokenMover::new(
            self.token_program.to_account_info(),
            self.relay_authority.to_account_info(),
            self.config.relay_bump,
            remaining,
        );
        let rent = RentPayer {
            payer: self.payer.to_account_info(),
            system_program: self.system_program.to_account_info(),
        };

        self.owner_index.bump = bumps.owner_index;
        self.owner_pool_index.bump = bumps.owner_pool_index;

        let store = AccountStore::new(&mut self.loan)
            .with_registry(&mut self.config, bumps.loan)
            .with_indices(
                IndexPair {
                    by_owner: &mut self.owner_index,
                    by_owner_pool: &mut self.owner_pool_index,
                },
                rent,
            );
        let clock = Clock::get()?;
        Ok(LoanEngine::new(
            store,
            pool,
            CustodyRelay::new(mover),
            CallClock::from(&clock),
        ))
    }
}

/// Act on an existing loan; the signer must own it
#[derive(Accounts)]
pub struct ManageLoan<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(
        seeds = [CONFIG_SEED],
        bump = config.bump
    )]
    pub config: Account<'info, ManagerConfig>,

    /// CHECK: Resolved to a pool record in the handler
    pub pool: UncheckedAccount<'info>,

    #[account(
        mut,
        seeds = [LOAN_SEED, &loan.sequence.to_le_bytes()],
        bump = loan.bump
    )]
    pub loan: Account<'info, Loan>,

    /// CHECK: Signs pool and rebalancer CPIs, validated by seeds
    #[account(
        seeds = [MANAGER_AUTHORITY_SEED],
        bump = config.authority_bump
    )]
    pub manager_authority: UncheckedAccount<'info>,

    /// CHECK: Relay delegate, validated by seeds
    #[account(
        seeds = [RELAY_SEED],
        bump = config.relay_bump
    )]
    pub relay_authority: UncheckedAccount<'info>,

    /// CHECK: Compared with the program stored in the pool record
    pub pool_program: UncheckedAccount<'info>,

    /// CHECK: External rebalancer program, matched against the parameters
    pub rebalancer: Option<UncheckedAccount<'info>>,

    pub token_program: Program<'info, Token>,
}

impl<'info> ManageLoan<'info> {
    pub fn rebalancer(&self, remaining: &[AccountInfo<'info>]) -> CpiRebalancer<'info> {
        CpiRebalancer::new(
            self.rebalancer.as_ref().map(|program| program.to_account_info()),
            self.manager_authority.to_account_info(),
            self.config.authority_bump,
            remaining,
        )
    }

    pub fn engine<'a>(&'a mut self, remaining: &[AccountInfo<'info>]) -> Result<ChainEngine<'a, 'info>> {
        let handle = resolve_account(&self.pool.to_account_info())?;
        let pool = CpiPool::new(
            handle,
            self.pool.to_account_info(),
            self.pool_program.to_account_info(),
            self.manager_authority.to_account_info(),
            self.config.authority_bump,
            remaining,
        )?;
        let mover = SplTokenMover::new(
            self.token_program.to_account_info(),
            self.relay_authority.to_account_info(),
            self.config.relay_bump,
            remaining,
        );
        let clock = Clock::get()?;
        Ok(LoanEngine::new(
            AccountStore::new(&mut self.loan),
            pool,
            CustodyRelay::new(mover),
            CallClock::from(&clock),
        ))
    }
}

pub fn create_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, NewLoan<'info>>,
    owner: Pubkey,
    ref_id: u16,
    deadline: i64,
) -> Result<LoanReceipt> {
    let mut engine = ctx.accounts.engine(&ctx.bumps, ctx.remaining_accounts)?;
    let receipt = engine.create_loan(&owner, ref_id, deadline)?;
    emit_all(engine.take_events());
    msg!("loan {} opened on {}", receipt.loan_id, receipt.pool);
    Ok(receipt)
}

pub fn create_borrow_and_rebalance_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, NewLoan<'info>>,
    owner: Pubkey,
    params: CreateLoanBorrowAndRebalanceParams,
) -> Result<LoanReceipt> {
    let payer = ctx.accounts.payer.key();
    let mut engine = ctx.accounts.engine(&ctx.bumps, ctx.remaining_accounts)?;
    let receipt = engine.create_loan_borrow_and_rebalance(&owner, &payer, &params)?;
    emit_all(engine.take_events());
    msg!("loan {} opened with liquidity {}", receipt.loan_id, receipt.liquidity);
    Ok(receipt)
}

pub fn create_borrow_and_rebalance_externally_handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, NewLoan<'info>>,
    owner: Pubkey,
    params: CreateLoanBorrowAndRebalanceExternallyParams,
) -> Result<LoanReceipt> {
    let payer = ctx.accounts.payer.key();
    let mut rebalancer = ctx.accounts.rebalancer(ctx.remaining_accounts);
    let mut engine = ctx.accounts.engine(&ctx.bumps, ctx.remaining_accounts)?;
    let receipt = engine.create_loan_borrow_and_rebalance_externally(
        &owner,
        &payer,
        &params,
        &mut rebalancer,
    )?;
    emit_all(engine.take_events());
    msg!("loan {} opened with liquidity {}", receipt.loan_id, receipt.liquidity);
    Ok(receipt)
}
