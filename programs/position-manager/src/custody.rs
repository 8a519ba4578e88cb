//! Token custody relay

use anchor_lang::prelude::*;
use anchor_spl::token::{self, TokenAccount, Transfer};

use crate::constants::RELAY_SEED;
use crate::errors::PositionError;
use crate::resolver::pool_address;

/// Moves `amount` of `mint` from the account owned by `from` to the one
/// owned by `to`.
///
/// A failed engine operation rolls the mover back to its last checkpoint.
/// SPL transfers keep the no-op defaults; the runtime reverts them.
pub trait TokenMover {
    fn move_tokens(&mut self, mint: &Pubkey, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()>;

    fn checkpoint(&mut self) {}

    fn rollback(&mut self) {}
}

impl<T: TokenMover + ?Sized> TokenMover for &mut T {
    fn move_tokens(&mut self, mint: &Pubkey, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()> {
        (**self).move_tokens(mint, from, to, amount)
    }

    fn checkpoint(&mut self) {
        (**self).checkpoint()
    }

    fn rollback(&mut self) {
        (**self).rollback()
    }
}

/// Context a pool hands back when it asks the relay for tokens
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct RelayContext {
    pub protocol_id: u16,
    pub cfmm: Pubkey,
    pub payer: Pubkey,
}

impl RelayContext {
    pub fn pool(&self) -> Pubkey {
        pool_address(self.protocol_id, &self.cfmm).0
    }
}

/// Pulls tokens from payers who approved the relay, but only on behalf of
/// the pool of an operation the relay itself opened.
pub struct CustodyRelay<M> {
    mover: M,
    in_flight: Option<RelayContext>,
}

impl<M: TokenMover> CustodyRelay<M> {
    pub fn new(mover: M) -> Self {
        Self {
            mover,
            in_flight: None,
        }
    }

    pub fn open(&mut self, context: RelayContext) {
        self.in_flight = Some(context);
    }

    pub fn close(&mut self) {
        self.in_flight = None;
    }

    pub fn in_flight(&self) -> Option<&RelayContext> {
        self.in_flight.as_ref()
    }

    pub fn mover(&self) -> &M {
        &self.mover
    }

    pub fn checkpoint(&mut self) {
        self.mover.checkpoint();
    }

    pub fn rollback(&mut self) {
        self.mover.rollback();
    }

    /// Transfer `amounts` of `tokens` from the context's payer to `payee`.
    pub fn send_tokens(
        &mut self,
        caller: &Pubkey,
        context: &RelayContext,
        tokens: &[Pubkey],
        amounts: &[u64],
        payee: &Pubkey,
    ) -> Result<()> {
        require_keys_eq!(*caller, context.pool(), PositionError::NotAuthorizedCaller);
        let open = self.in_flight().ok_or(PositionError::NotAuthorizedCaller)?;
        require!(open == context, PositionError::NotAuthorizedCaller);
        require!(
            amounts.len() <= tokens.len(),
            PositionError::InvalidAmountsLength
        );

        for (mint, amount) in tokens.iter().zip(amounts) {
            if *amount > 0 {
                self.mover.move_tokens(mint, &context.payer, payee, *amount)?;
            }
        }
        Ok(())
    }
}

/// SPL token transfers signed by the relay delegate PDA.
///
/// Token accounts are looked up among `accounts` by mint and owner, so the
/// caller forwards every account a pool may touch.
pub struct SplTokenMover<'info> {
    token_program: AccountInfo<'info>,
    delegate: AccountInfo<'info>,
    delegate_bump: u8,
    accounts: Vec<AccountInfo<'info>>,
}

impl<'info> SplTokenMover<'info> {
    pub fn new(
        token_program: AccountInfo<'info>,
        delegate: AccountInfo<'info>,
        delegate_bump: u8,
        accounts: &[AccountInfo<'info>],
    ) -> Self {
        Self {
            token_program,
            delegate,
            delegate_bump,
            accounts: accounts.to_vec(),
        }
    }

    fn token_account(&self, mint: &Pubkey, owner: &Pubkey) -> Result<AccountInfo<'info>> {
        self.accounts
            .iter()
            .find(|info| {
                info.owner == &token::ID
                    && info
                        .try_borrow_data()
                        .ok()
                        .and_then(|data| TokenAccount::try_deserialize(&mut &data[..]).ok())
                        .map_or(false, |account| account.mint == *mint && account.owner == *owner)
            })
            .cloned()
            .ok_or_else(|| error!(PositionError::TokenAccountNotFound))
    }
}

impl<'info> TokenMover for SplTokenMover<'info> {
    fn move_tokens(&mut self, mint: &Pubkey, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()> {
        let source = self.token_account(mint, from)?;
        let destination = self.token_account(mint, to)?;

        let seeds = &[RELAY_SEED, &[self.delegate_bump]];
        let signer = &[&seeds[..]];

        let transfer_ctx = CpiContext::new_with_signer(
            self.token_program.clone(),
            Transfer {
                from: source,
                to: destination,
                authority: self.delegate.clone(),
            },
            signer,
        );
        token::transfer(transfer_ctx, amount)
    }
}
