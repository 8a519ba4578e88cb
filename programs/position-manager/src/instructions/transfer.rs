use anchor_lang::prelude::*;
use crate::constants::*;
use crate::events::{emit_all, Approval, ApprovalForAll, LoanEvent, LoanUpdate};
use crate::ledger::{transfer_owner, AccountStore, IndexPair, RentPayer};
use crate::state::*;

/// Hand a loan to a new owner
///
/// The signer is the owner, the loan's approved key, or an operator the
/// owner approved; an operator passes its `operator_approval` account. The
/// loan's entries in the current owner's indices are tombstoned and fresh
/// entries are appended to the recipient's, which are created on first use.
#[derive(Accounts)]
#[instruction(new_owner: Pubkey)]
pub struct TransferLoan<'info> {
    #[account(mut)]
    pub authority: Signer<'info>,

    #[account(
        mut,
        seeds = [LOAN_SEED, &loan.sequence.to_le_bytes()],
        bump = loan.bump
    )]
    pub loan: Account<'info, Loan>,

    /// Only counts when it names the loan's owner and the signer
    pub operator_approval: Option<Account<'info, OperatorApproval>>,

    #[account(
        mut,
        seeds = [OWNER_INDEX_SEED, loan.owner.as_ref()],
        bump = owner_index.bump
    )]
    pub owner_index: Account<'info, LoanIndex>,

    #[account(
        mut,
        seeds = [OWNER_POOL_INDEX_SEED, loan.owner.as_ref(), loan.pool.as_ref()],
        bump = owner_pool_index.bump
    )]
    pub owner_pool_index: Account<'info, LoanIndex>,

    #[account(
        init_if_needed,
        payer = authority,
        space = LoanIndex::space(INDEX_INITIAL_SLOTS),
        seeds = [OWNER_INDEX_SEED, new_owner.as_ref()],
        bump
    )]
    pub new_owner_index: Account<'info, LoanIndex>,

    #[account(
        init_if_needed,
        payer = authority,
        space = LoanIndex::space(INDEX_INITIAL_SLOTS),
        seeds = [OWNER_POOL_INDEX_SEED, new_owner.as_ref(), loan.pool.as_ref()],
        bump
    )]
    pub new_owner_pool_index: Account<'info, LoanIndex>,

    pub system_program: Program<'info, System>,
}

pub fn handler(ctx: Context<TransferLoan>, new_owner: Pubkey) -> Result<()> {
    let clock = Clock::get()?;
    let accounts = &mut *ctx.accounts;
    let caller = accounts.authority.key();
    let loan_id = accounts.loan.id;
    let operator_approved = is_operator(&accounts.operator_approval, &accounts.loan, &caller);

    accounts.new_owner_index.bump = ctx.bumps.new_owner_index;
    accounts.new_owner_pool_index.bump = ctx.bumps.new_owner_pool_index;

    let rent = RentPayer {
        payer: accounts.authority.to_account_info(),
        system_program: accounts.system_program.to_account_info(),
    };
    let mut store = AccountStore::new(&mut accounts.loan)
        .with_indices(
            IndexPair {
                by_owner: &mut accounts.owner_index,
                by_owner_pool: &mut accounts.owner_pool_index,
            },
            rent,
        )
        .with_incoming(IndexPair {
            by_owner: &mut accounts.new_owner_index,
            by_owner_pool: &mut accounts.new_owner_pool_index,
        });

    let (loan, transferred) = transfer_owner(
        &mut store,
        &caller,
        operator_approved,
        loan_id,
        new_owner,
        clock.unix_timestamp,
    )?;
    msg!("loan {} transferred to {}", loan_id, new_owner);

    emit_all(vec![
        LoanEvent::LoanTransferred(transferred),
        LoanEvent::LoanUpdate(LoanUpdate::snapshot(&loan, clock.unix_timestamp)),
    ]);

    Ok(())
}

fn is_operator(approval: &Option<Account<OperatorApproval>>, loan: &Loan, caller: &Pubkey) -> bool {
    approval
        .as_ref()
        .map_or(false, |approval| approval.grants(&loan.owner, caller))
}

/// Let one key transfer a loan; the default key revokes
#[derive(Accounts)]
pub struct ApproveLoan<'info> {
    pub authority: Signer<'info>,

    #[account(
        mut,
        seeds = [LOAN_SEED, &loan.sequence.to_le_bytes()],
        bump = loan.bump
    )]
    pub loan: Account<'info, Loan>,

    /// Only counts when it names the loan's owner and the signer
    pub operator_approval: Option<Account<'info, OperatorApproval>>,
}

pub fn approve_handler(ctx: Context<ApproveLoan>, approved: Pubkey) -> Result<()> {
    let caller = ctx.accounts.authority.key();
    let operator = is_operator(&ctx.accounts.operator_approval, &ctx.accounts.loan, &caller);

    let loan = &mut ctx.accounts.loan;
    loan.approve(&caller, operator, approved)?;
    msg!("loan {} approved for {}", loan.id, approved);

    emit!(Approval {
        loan_id: loan.id,
        owner: loan.owner,
        approved,
        timestamp: Clock::get()?.unix_timestamp,
    });
    Ok(())
}

/// Grant or revoke an operator's right to move all of the signer's loans
#[derive(Accounts)]
#[instruction(operator: Pubkey)]
pub struct SetApprovalForAll<'info> {
    #[account(mut)]
    pub owner: Signer<'info>,

    #[account(
        init_if_needed,
        payer = owner,
        space = OperatorApproval::SIZE,
        seeds = [OPERATOR_SEED, owner.key().as_ref(), operator.as_ref()],
        bump
    )]
    pub operator_approval: Account<'info, OperatorApproval>,

    pub system_program: Program<'info, System>,
}

pub fn set_approval_for_all_handler(
    ctx: Context<SetApprovalForAll>,
    operator: Pubkey,
    approved: bool,
) -> Result<()> {
    let owner = ctx.accounts.owner.key();
    ctx.accounts
        .operator_approval
        .set(owner, operator, approved, ctx.bumps.operator_approval)?;
    msg!("operator {} for {}: {}", operator, owner, approved);

    emit!(ApprovalForAll {
        owner,
        operator,
        approved,
        timestamp: Clock::get()?.unix_timestamp,
    });
    Ok(())
}
