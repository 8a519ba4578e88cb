use anchor_lang::prelude::*;
use crate::constants::*;
use crate::events::PoolCreated;
use crate::state::*;

/// Create the pool for `(protocol_id, cfmm)`
///
/// The pool record lives at a PDA derived from its protocol id and cfmm, so
/// its address is known before it exists.
#[derive(Accounts)]
#[instruction(protocol_id: u16, cfmm: Pubkey)]
pub struct CreatePool<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,

    #[account(
        mut,
        seeds = [CONFIG_SEED],
        bump = config.bump
    )]
    pub config: Account<'info, ManagerConfig>,

    /// CHECK: Registry entry for the protocol id; empty when unregistered
    #[account(
        seeds = [PROTOCOL_SEED, &protocol_id.to_le_bytes()],
        bump
    )]
    pub protocol: UncheckedAccount<'info>,

    #[account(
        init_if_needed,
        payer = payer,
        space = PoolRecord::SIZE,
        seeds = [POOL_SEED, &protocol_id.to_le_bytes(), cfmm.as_ref()],
        bump
    )]
    pub pool: Account<'info, PoolRecord>,

    pub system_program: Program<'info, System>,
}

pub fn handler(
    ctx: Context<CreatePool>,
    protocol_id: u16,
    cfmm: Pubkey,
    tokens: Vec<Pubkey>,
) -> Result<Pubkey> {
    let protocol = registered_protocol(&ctx.accounts.protocol.to_account_info());
    let clock = Clock::get()?;

    let pool = &mut ctx.accounts.pool;
    pool.open(
        protocol.as_ref(),
        protocol_id,
        cfmm,
        tokens.clone(),
        clock.unix_timestamp,
        ctx.bumps.pool,
    )?;

    let config = &mut ctx.accounts.config;
    let pool_count = config.record_pool()?;

    let pool_key = pool.key();
    msg!("pool {} created for protocol {}", pool_key, protocol_id);

    emit!(PoolCreated {
        pool: pool_key,
        protocol_id,
        cfmm,
        tokens,
        pool_count,
        timestamp: clock.unix_timestamp,
    });

    Ok(pool_key)
}

fn registered_protocol(info: &AccountInfo) -> Option<ProtocolRecord> {
    if info.owner != &crate::ID || info.data_is_empty() {
        return None;
    }
    let data = info.try_borrow_data().ok()?;
    ProtocolRecord::try_deserialize(&mut &data[..]).ok()
}
