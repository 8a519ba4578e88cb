use anchor_lang::prelude::*;
use anchor_spl::token::Token;
use crate::constants::*;
use crate::custody::{CustodyRelay, RelayContext, SplTokenMover};
use crate::errors::PositionError;
use crate::resolver::{pool_authority, resolve_account};
use crate::state::*;

/// Token pull requested by a pool program
///
/// The pool proves who it is by signing with its authority PDA, and the
/// payer named in the context must sign the same transaction. Tokens go to
/// the pool's vaults and nowhere else.
#[derive(Accounts)]
pub struct SendTokensCallback<'info> {
    pub payer: Signer<'info>,

    #[account(
        seeds = [CONFIG_SEED],
        bump = config.bump
    )]
    pub config: Account<'info, ManagerConfig>,

    /// CHECK: Resolved to a pool record in the handler
    pub pool: UncheckedAccount<'info>,

    /// Authority PDA of the pool's registered program
    pub pool_authority: Signer<'info>,

    /// CHECK: Relay delegate, validated by seeds
    #[account(
        seeds = [RELAY_SEED],
        bump = config.relay_bump
    )]
    pub relay_authority: UncheckedAccount<'info>,

    pub token_program: Program<'info, Token>,
}

pub fn handler<'info>(
    ctx: Context<'_, '_, 'info, 'info, SendTokensCallback<'info>>,
    context: RelayContext,
    tokens: Vec<Pubkey>,
    amounts: Vec<u64>,
) -> Result<()> {
    let handle = resolve_account(&ctx.accounts.pool.to_account_info())?;
    let (custodian, _) = pool_authority(&handle.address, &handle.pool_program);
    require_keys_eq!(
        ctx.accounts.pool_authority.key(),
        custodian,
        PositionError::NotAuthorizedCaller
    );
    require!(
        tokens
            .iter()
            .all(|mint| *mint == handle.cfmm || handle.tokens.contains(mint)),
        PositionError::NotAuthorizedCaller
    );

    let mover = SplTokenMover::new(
        ctx.accounts.token_program.to_account_info(),
        ctx.accounts.relay_authority.to_account_info(),
        ctx.accounts.config.relay_bump,
        ctx.remaining_accounts,
    );
    let mut relay = CustodyRelay::new(mover);
    relay.open(RelayContext {
        protocol_id: handle.protocol_id,
        cfmm: handle.cfmm,
        payer: ctx.accounts.payer.key(),
    });
    relay.send_tokens(&handle.address, &context, &tokens, &amounts, &custodian)?;
    relay.close();

    msg!("relayed {} legs to pool {}", amounts.len(), handle.address);
    Ok(())
}
