use anchor_lang::prelude::*;
use crate::constants::*;
use crate::events::{FeeUpdated, ProtocolAdded};
use crate::state::*;

/// Initialize the manager configuration
///
/// Called once. The initializer becomes the authority, the fee recipient
/// and the fee setter.
#[derive(Accounts)]
pub struct Initialize<'info> {
    #[account(mut)]
    pub authority: Signer<'info>,

    #[account(
        init,
        payer = authority,
        space = ManagerConfig::SIZE,
        seeds = [CONFIG_SEED],
        bump
    )]
    pub config: Account<'info, ManagerConfig>,

    /// CHECK: PDA that signs pool and rebalancer CPIs, validated by seeds
    #[account(seeds = [MANAGER_AUTHORITY_SEED], bump)]
    pub manager_authority: UncheckedAccount<'info>,

    /// CHECK: Relay delegate PDA, validated by seeds
    #[account(seeds = [RELAY_SEED], bump)]
    pub relay_authority: UncheckedAccount<'info>,

    pub system_program: Program<'info, System>,
}

pub fn handler(ctx: Context<Initialize>, fee: Option<u64>) -> Result<()> {
    let fee = fee.unwrap_or(DEFAULT_FEE);
    let authority = ctx.accounts.authority.key();
    let config = &mut ctx.accounts.config;

    config.initialize(
        authority,
        fee,
        ctx.bumps.config,
        ctx.bumps.manager_authority,
        ctx.bumps.relay_authority,
    );
    msg!("manager initialized, fee {}", fee);

    emit!(FeeUpdated {
        fee,
        fee_to: config.fee_to,
        fee_to_setter: config.fee_to_setter,
        timestamp: Clock::get()?.unix_timestamp,
    });

    Ok(())
}

/// Change fee settings; only the fee setter may do so
#[derive(Accounts)]
pub struct UpdateFees<'info> {
    pub fee_to_setter: Signer<'info>,

    #[account(
        mut,
        seeds = [CONFIG_SEED],
        bump = config.bump
    )]
    pub config: Account<'info, ManagerConfig>,
}

pub fn set_fee_handler(ctx: Context<UpdateFees>, fee: u64) -> Result<()> {
    let caller = ctx.accounts.fee_to_setter.key();
    ctx.accounts.config.set_fee(&caller, fee)?;
    emit_fee_update(&ctx.accounts.config)
}

pub fn set_fee_to_handler(ctx: Context<UpdateFees>, fee_to: Pubkey) -> Result<()> {
    let caller = ctx.accounts.fee_to_setter.key();
    ctx.accounts.config.set_fee_to(&caller, fee_to)?;
    emit_fee_update(&ctx.accounts.config)
}

pub fn set_fee_to_setter_handler(ctx: Context<UpdateFees>, fee_to_setter: Pubkey) -> Result<()> {
    let caller = ctx.accounts.fee_to_setter.key();
    ctx.accounts.config.set_fee_to_setter(&caller, fee_to_setter)?;
    emit_fee_update(&ctx.accounts.config)
}

fn emit_fee_update(config: &ManagerConfig) -> Result<()> {
    msg!("fee {} to {}", config.fee, config.fee_to);
    emit!(FeeUpdated {
        fee: config.fee,
        fee_to: config.fee_to,
        fee_to_setter: config.fee_to_setter,
        timestamp: Clock::get()?.unix_timestamp,
    });
    Ok(())
}

/// Register the program implementing pools of a protocol id
#[derive(Accounts)]
#[instruction(protocol_id: u16)]
pub struct AddProtocol<'info> {
    #[account(mut)]
    pub authority: Signer<'info>,

    #[account(
        seeds = [CONFIG_SEED],
        bump = config.bump
    )]
    pub config: Account<'info, ManagerConfig>,

    #[account(
        init,
        payer = authority,
        space = ProtocolRecord::SIZE,
        seeds = [PROTOCOL_SEED, &protocol_id.to_le_bytes()],
        bump
    )]
    pub protocol: Account<'info, ProtocolRecord>,

    /// CHECK: Any executable program; it is only ever invoked
    #[account(executable)]
    pub pool_program: UncheckedAccount<'info>,

    pub system_program: Program<'info, System>,
}

pub fn add_protocol_handler(ctx: Context<AddProtocol>, protocol_id: u16) -> Result<()> {
    let pool_program = ctx.accounts.pool_program.key();
    let record = ctx.accounts.config.register_protocol(
        &ctx.accounts.authority.key(),
        protocol_id,
        pool_program,
        ctx.bumps.protocol,
    )?;
    ctx.accounts.protocol.set_inner(record);
    msg!("protocol {} -> {}", protocol_id, pool_program);

    emit!(ProtocolAdded {
        protocol_id,
        pool_program,
        timestamp: Clock::get()?.unix_timestamp,
    });

    Ok(())
}
