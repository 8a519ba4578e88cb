//! Position ledger: where loans and their owner indices live

use anchor_lang::prelude::*;
use anchor_lang::system_program::{self, Transfer};
use anchor_lang::AccountsExit;

use crate::constants::INDEX_GROWTH_SLOTS;
use crate::errors::PositionError;
use crate::events::LoanTransferred;
use crate::state::{Loan, LoanIndex, ManagerConfig};

/// Storage the lifecycle engine runs against.
///
/// `insert` registers a new loan in the ledger and appends it to both of
/// its owner's indices. `reassign` moves index entries between owners and
/// leaves a tombstone behind.
///
/// `checkpoint` and `rollback` bracket one engine operation: a failed
/// operation rolls the store back to its checkpoint. Account-backed stores
/// keep the defaults, since a failed instruction reverts every account it
/// wrote.
pub trait PositionStore {
    fn allocate_id(&mut self, round: u64) -> Result<u64>;

    fn insert(&mut self, loan: Loan) -> Result<()>;

    /// Fails with `UnknownPosition` for an id that was never inserted
    fn load(&self, loan_id: u64) -> Result<Loan>;

    fn save(&mut self, loan: &Loan) -> Result<()>;

    fn reassign(&mut self, loan: &Loan, new_owner: &Pubkey) -> Result<()>;

    fn checkpoint(&mut self) {}

    fn rollback(&mut self) {}
}

impl<S: PositionStore + ?Sized> PositionStore for &mut S {
    fn allocate_id(&mut self, round: u64) -> Result<u64> {
        (**self).allocate_id(round)
    }

    fn insert(&mut self, loan: Loan) -> Result<()> {
        (**self).insert(loan)
    }

    fn load(&self, loan_id: u64) -> Result<Loan> {
        (**self).load(loan_id)
    }

    fn save(&mut self, loan: &Loan) -> Result<()> {
        (**self).save(loan)
    }

    fn reassign(&mut self, loan: &Loan, new_owner: &Pubkey) -> Result<()> {
        (**self).reassign(loan, new_owner)
    }

    fn checkpoint(&mut self) {
        (**self).checkpoint()
    }

    fn rollback(&mut self) {
        (**self).rollback()
    }
}

/// Hand a loan to `new_owner`, tombstoning the old owner's index slots.
///
/// The owner, the loan's approved key, or an operator the owner approved
/// (`operator_approved`) may transfer. The per-loan approval is cleared.
pub fn transfer_owner<S: PositionStore>(
    store: &mut S,
    caller: &Pubkey,
    operator_approved: bool,
    loan_id: u64,
    new_owner: Pubkey,
    timestamp: i64,
) -> Result<(Loan, LoanTransferred)> {
    let mut loan = store.load(loan_id)?;
    require!(
        loan.may_transfer(caller, operator_approved),
        PositionError::NotLoanOwner
    );
    require_keys_neq!(new_owner, Pubkey::default(), PositionError::ZeroAddress);
    require_keys_neq!(new_owner, loan.owner, PositionError::InvalidRecipient);

    store.reassign(&loan, &new_owner)?;
    let from = loan.owner;
    loan.owner = new_owner;
    loan.approved = Pubkey::default();
    store.save(&loan)?;

    let event = LoanTransferred {
        loan_id,
        pool: loan.pool,
        from,
        to: new_owner,
        timestamp,
    };
    Ok((loan, event))
}

/// Store for calls that move pool liquidity without touching a loan
pub struct NoPositions;

impl PositionStore for NoPositions {
    fn allocate_id(&mut self, _round: u64) -> Result<u64> {
        err!(PositionError::AccountNotProvided)
    }

    fn insert(&mut self, _loan: Loan) -> Result<()> {
        err!(PositionError::AccountNotProvided)
    }

    fn load(&self, _loan_id: u64) -> Result<Loan> {
        err!(PositionError::UnknownPosition)
    }

    fn save(&mut self, _loan: &Loan) -> Result<()> {
        err!(PositionError::UnknownPosition)
    }

    fn reassign(&mut self, _loan: &Loan, _new_owner: &Pubkey) -> Result<()> {
        err!(PositionError::UnknownPosition)
    }
}

/// An owner's two indices: across all pools and within the loan's pool
pub struct IndexPair<'a, 'info> {
    pub by_owner: &'a mut Account<'info, LoanIndex>,
    pub by_owner_pool: &'a mut Account<'info, LoanIndex>,
}

/// Accounts a store needs to create or grow index accounts
pub struct RentPayer<'info> {
    pub payer: AccountInfo<'info>,
    pub system_program: AccountInfo<'info>,
}

/// Ledger backed by program accounts.
///
/// Every instruction works on a single loan account, so the store only
/// knows the loan it was built with; any other id is `UnknownPosition`.
/// Creating and transferring additionally need the config, index and rent
/// accounts, which are attached with the builder methods.
pub struct AccountStore<'a, 'info> {
    loan: &'a mut Account<'info, Loan>,
    loan_bump: u8,
    config: Option<&'a mut Account<'info, ManagerConfig>>,
    indices: Option<IndexPair<'a, 'info>>,
    incoming: Option<IndexPair<'a, 'info>>,
    rent: Option<RentPayer<'info>>,
}

impl<'a, 'info> AccountStore<'a, 'info> {
    pub fn new(loan: &'a mut Account<'info, Loan>) -> Self {
        Self {
            loan,
            loan_bump: 0,
            config: None,
            indices: None,
            incoming: None,
            rent: None,
        }
    }

    /// For a loan account initialized in this instruction
    pub fn with_registry(
        mut self,
        config: &'a mut Account<'info, ManagerConfig>,
        loan_bump: u8,
    ) -> Self {
        self.config = Some(config);
        self.loan_bump = loan_bump;
        self
    }

    pub fn with_indices(mut self, indices: IndexPair<'a, 'info>, rent: RentPayer<'info>) -> Self {
        self.indices = Some(indices);
        self.rent = Some(rent);
        self
    }

    /// The recipient's indices on a transfer
    pub fn with_incoming(mut self, incoming: IndexPair<'a, 'info>) -> Self {
        self.incoming = Some(incoming);
        self
    }

    fn is_live(&self) -> bool {
        self.loan.id != 0
    }

    fn append(
        pair: &mut IndexPair<'a, 'info>,
        rent: &RentPayer<'info>,
        owner: &Pubkey,
        loan: &Loan,
        loan_key: Pubkey,
    ) -> Result<()> {
        for index in [&mut *pair.by_owner, &mut *pair.by_owner_pool] {
            grow_index(index, rent)?;
            index.append(loan.id, loan_key);
        }
        // Freshly created indices start zeroed.
        if pair.by_owner.owner == Pubkey::default() {
            pair.by_owner.owner = *owner;
        }
        if pair.by_owner_pool.owner == Pubkey::default() {
            pair.by_owner_pool.owner = *owner;
            pair.by_owner_pool.pool = loan.pool;
        }
        Ok(())
    }
}

impl<'a, 'info> PositionStore for AccountStore<'a, 'info> {
    fn allocate_id(&mut self, round: u64) -> Result<u64> {
        let config = self
            .config
            .as_mut()
            .ok_or(PositionError::AccountNotProvided)?;
        config.id_allocator.next_id(round)
    }

    fn insert(&mut self, mut loan: Loan) -> Result<()> {
        let config = self
            .config
            .as_mut()
            .ok_or(PositionError::AccountNotProvided)?;
        loan.sequence = config.next_loan_sequence()?;
        loan.bump = self.loan_bump;

        let loan_key = self.loan.key();
        let rent = self.rent.as_ref().ok_or(PositionError::AccountNotProvided)?;
        let pair = self
            .indices
            .as_mut()
            .ok_or(PositionError::AccountNotProvided)?;
        Self::append(pair, rent, &loan.owner, &loan, loan_key)?;

        self.loan.set_inner(loan);
        self.loan.exit(&crate::ID)
    }

    fn load(&self, loan_id: u64) -> Result<Loan> {
        require!(loan_id != 0 && self.is_live(), PositionError::UnknownPosition);
        // Read the bytes, not the cached copy, so changes made during a CPI
        // are seen.
        let info = self.loan.to_account_info();
        let data = info.try_borrow_data()?;
        let loan = Loan::try_deserialize(&mut &data[..])?;
        require!(loan.id == loan_id, PositionError::UnknownPosition);
        Ok(loan)
    }

    fn save(&mut self, loan: &Loan) -> Result<()> {
        require!(
            self.is_live() && self.loan.id == loan.id,
            PositionError::UnknownPosition
        );
        let mut stored = loan.clone();
        stored.sequence = self.loan.sequence;
        stored.bump = self.loan.bump;
        self.loan.set_inner(stored);
        self.loan.exit(&crate::ID)
    }

    fn reassign(&mut self, loan: &Loan, new_owner: &Pubkey) -> Result<()> {
        let loan_key = self.loan.key();
        let rent = self.rent.as_ref().ok_or(PositionError::AccountNotProvided)?;

        let outgoing = self
            .indices
            .as_mut()
            .ok_or(PositionError::AccountNotProvided)?;
        outgoing.by_owner.tombstone(loan.id)?;
        outgoing.by_owner_pool.tombstone(loan.id)?;

        let incoming = self
            .incoming
            .as_mut()
            .ok_or(PositionError::AccountNotProvided)?;
        Self::append(incoming, rent, new_owner, loan, loan_key)
    }
}

/// Make room for one more slot, topping up rent from the payer
pub fn grow_index<'info>(index: &mut Account<'info, LoanIndex>, rent: &RentPayer<'info>) -> Result<()> {
    let info = index.to_account_info();
    if index.has_room(info.data_len()) {
        return Ok(());
    }

    let new_len = LoanIndex::space(index.slots.len() + INDEX_GROWTH_SLOTS);
    let required = Rent::get()?.minimum_balance(new_len);
    let shortfall = required.saturating_sub(info.lamports());
    if shortfall > 0 {
        system_program::transfer(
            CpiContext::new(
                rent.system_program.clone(),
                Transfer {
                    from: rent.payer.clone(),
                    to: info.clone(),
                },
            ),
            shortfall,
        )?;
    }
    info.realloc(new_len, false)?;
    Ok(())
}

