//! External rebalance protocol

use anchor_lang::prelude::*;
use anchor_lang::solana_program::program::invoke_signed;
use solana_program::instruction::{AccountMeta, Instruction};

use crate::constants::MANAGER_AUTHORITY_SEED;
use crate::errors::PositionError;
use crate::pool::instruction_discriminator;

/// Everything a rebalancer is told about the loan it works on
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RebalanceRequest {
    pub loan_id: u64,
    pub pool: Pubkey,
    pub amounts: Vec<u64>,
    pub lp_tokens: u64,
    pub data: Vec<u8>,
}

/// Untrusted code that receives custody of collateral for the length of
/// one synchronous call. It may re-enter the manager, so nothing read
/// before the call is trusted after it.
pub trait ExternalRebalancer {
    /// `Pubkey::default()` when no rebalancer was supplied
    fn key(&self) -> Pubkey;

    fn external_call(&mut self, request: &RebalanceRequest) -> Result<()>;
}

impl<R: ExternalRebalancer + ?Sized> ExternalRebalancer for &mut R {
    fn key(&self) -> Pubkey {
        (**self).key()
    }

    fn external_call(&mut self, request: &RebalanceRequest) -> Result<()> {
        (**self).external_call(request)
    }
}

/// Invokes `external_rebalance` on the rebalancer program, signed by the
/// manager authority PDA.
pub struct CpiRebalancer<'info> {
    program: Option<AccountInfo<'info>>,
    authority: AccountInfo<'info>,
    authority_bump: u8,
    accounts: Vec<AccountInfo<'info>>,
}

impl<'info> CpiRebalancer<'info> {
    pub fn new(
        program: Option<AccountInfo<'info>>,
        authority: AccountInfo<'info>,
        authority_bump: u8,
        accounts: &[AccountInfo<'info>],
    ) -> Self {
        Self {
            program,
            authority,
            authority_bump,
            accounts: accounts.to_vec(),
        }
    }
}

impl<'info> ExternalRebalancer for CpiRebalancer<'info> {
    fn key(&self) -> Pubkey {
        self.program
            .as_ref()
            .map(|program| *program.key)
            .unwrap_or_default()
    }

    fn external_call(&mut self, request: &RebalanceRequest) -> Result<()> {
        let program = self
            .program
            .as_ref()
            .ok_or(PositionError::InvalidRebalancer)?;

        let mut data = instruction_discriminator("external_rebalance").to_vec();
        request
            .serialize(&mut data)
            .map_err(|_| error!(PositionError::InvalidRebalancer))?;

        let mut metas = vec![AccountMeta::new_readonly(*self.authority.key, true)];
        metas.extend(self.accounts.iter().map(|info| {
            if info.is_writable {
                AccountMeta::new(*info.key, info.is_signer)
            } else {
                AccountMeta::new_readonly(*info.key, info.is_signer)
            }
        }));

        let mut infos = vec![self.authority.clone()];
        infos.extend(self.accounts.iter().cloned());
        infos.push(program.clone());

        let ix = Instruction {
            program_id: *program.key,
            accounts: metas,
            data,
        };
        let seeds = &[MANAGER_AUTHORITY_SEED, &[self.authority_bump]];
        invoke_signed(&ix, &infos, &[&seeds[..]])?;
        Ok(())
    }
}
