use anchor_lang::prelude::*;
use crate::constants::*;
use crate::errors::PositionError;
use crate::math::mul_div;
use crate::resolver::validate_new_pool;

/// Global manager configuration
#[account]
#[derive(Default)]
pub struct ManagerConfig {
    /// Authority allowed to register protocols
    pub authority: Pubkey,
    /// Recipient of protocol fees
    pub fee_to: Pubkey,
    /// Only key allowed to change the fee settings
    pub fee_to_setter: Pubkey,
    /// Protocol fee, scaled by 1e18
    pub fee: u64,
    /// Loan id sequence
    pub id_allocator: IdAllocator,
    /// Number of loan accounts created so far (loan PDA sequence)
    pub loans_created: u64,
    /// Number of pools created through this manager
    pub pool_count: u64,
    /// Bump seed for the config PDA
    pub bump: u8,
    /// Bump seed for the manager authority PDA
    pub authority_bump: u8,
    /// Bump seed for the relay delegate PDA
    pub relay_bump: u8,
    /// Reserved for future upgrades
    pub _reserved: [u8; 32],
}

impl ManagerConfig {
    pub const SIZE: usize = 8 + // discriminator
        32 + // authority
        32 + // fee_to
        32 + // fee_to_setter
        8 +  // fee
        IdAllocator::SIZE +
        8 +  // loans_created
        8 +  // pool_count
        1 +  // bump
        1 +  // authority_bump
        1 +  // relay_bump
        32;  // _reserved

    pub fn initialize(
        &mut self,
        authority: Pubkey,
        fee: u64,
        bump: u8,
        authority_bump: u8,
        relay_bump: u8,
    ) {
        self.authority = authority;
        self.fee_to = authority;
        self.fee_to_setter = authority;
        self.fee = fee;
        self.id_allocator = IdAllocator::default();
        self.loans_created = 0;
        self.pool_count = 0;
        self.bump = bump;
        self.authority_bump = authority_bump;
        self.relay_bump = relay_bump;
    }

    fn require_fee_setter(&self, caller: &Pubkey) -> Result<()> {
        require_keys_eq!(*caller, self.fee_to_setter, PositionError::Forbidden);
        Ok(())
    }

    pub fn set_fee(&mut self, caller: &Pubkey, fee: u64) -> Result<()> {
        self.require_fee_setter(caller)?;
        self.fee = fee;
        Ok(())
    }

    pub fn set_fee_to(&mut self, caller: &Pubkey, fee_to: Pubkey) -> Result<()> {
        self.require_fee_setter(caller)?;
        self.fee_to = fee_to;
        Ok(())
    }

    pub fn set_fee_to_setter(&mut self, caller: &Pubkey, fee_to_setter: Pubkey) -> Result<()> {
        self.require_fee_setter(caller)?;
        require_keys_neq!(fee_to_setter, Pubkey::default(), PositionError::ZeroAddress);
        self.fee_to_setter = fee_to_setter;
        Ok(())
    }

    /// Registry entry for `protocol_id`; only the authority may add one
    pub fn register_protocol(
        &self,
        caller: &Pubkey,
        protocol_id: u16,
        pool_program: Pubkey,
        bump: u8,
    ) -> Result<ProtocolRecord> {
        require_keys_eq!(*caller, self.authority, PositionError::Forbidden);
        require!(protocol_id > 0, PositionError::InvalidProtocol);
        Ok(ProtocolRecord {
            protocol_id,
            pool_program,
            bump,
        })
    }

    pub fn record_pool(&mut self) -> Result<u64> {
        self.pool_count = self
            .pool_count
            .checked_add(1)
            .ok_or(PositionError::MathOverflow)?;
        Ok(self.pool_count)
    }

    /// Hands out the PDA sequence number for the next loan account
    pub fn next_loan_sequence(&mut self) -> Result<u64> {
        let sequence = self.loans_created;
        self.loans_created = sequence
            .checked_add(1)
            .ok_or(PositionError::MathOverflow)?;
        Ok(sequence)
    }
}

/// Loan id sequence generator.
///
/// Ids are `round * LOAN_ID_ROUND_MULTIPLIER + counter`, where `round` is the
/// slot of the creating transaction and `counter` restarts at 1 every round.
/// Several loans created in the same slot therefore still get distinct ids,
/// and an id is never 0, which the owner indices reserve for tombstones.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdAllocator {
    pub round: u64,
    pub counter: u64,
}

impl IdAllocator {
    pub const SIZE: usize = 8 + 8;

    pub fn next_id(&mut self, round: u64) -> Result<u64> {
        let counter = if round == self.round { self.counter + 1 } else { 1 };
        require!(
            counter < LOAN_ID_ROUND_MULTIPLIER,
            PositionError::LoanIdSpaceExhausted
        );
        // Rounds only move forward; an older slot would replay old ids.
        require!(round >= self.round, PositionError::LoanIdSpaceExhausted);

        let id = round
            .checked_mul(LOAN_ID_ROUND_MULTIPLIER)
            .and_then(|base| base.checked_add(counter))
            .ok_or(PositionError::MathOverflow)?;

        self.round = round;
        self.counter = counter;
        Ok(id)
    }
}

/// Registered pool implementation for a protocol id
#[account]
#[derive(Debug, Default, PartialEq)]
pub struct ProtocolRecord {
    pub protocol_id: u16,
    /// Program implementing pools of this protocol
    pub pool_program: Pubkey,
    pub bump: u8,
}

impl ProtocolRecord {
    pub const SIZE: usize = 8 + // discriminator
        2 +  // protocol_id
        32 + // pool_program
        1;   // bump
}

/// A pool created through this manager's factory
#[account]
#[derive(Default)]
pub struct PoolRecord {
    pub protocol_id: u16,
    /// Underlying constant-function market maker
    pub cfmm: Pubkey,
    /// Ordered pool assets
    pub tokens: Vec<Pubkey>,
    /// Program that executes the pool's primitives
    pub pool_program: Pubkey,
    pub created_at: i64,
    pub bump: u8,
}

impl PoolRecord {
    pub const SIZE: usize = 8 + // discriminator
        2 +  // protocol_id
        32 + // cfmm
        4 + 32 * MAX_POOL_TOKENS + // tokens
        32 + // pool_program
        8 +  // created_at
        1;   // bump

    pub fn is_initialized(&self) -> bool {
        self.cfmm != Pubkey::default()
    }

    /// Fill a fresh record for a pool of a registered protocol
    pub fn open(
        &mut self,
        protocol: Option<&ProtocolRecord>,
        protocol_id: u16,
        cfmm: Pubkey,
        tokens: Vec<Pubkey>,
        created_at: i64,
        bump: u8,
    ) -> Result<()> {
        let protocol = protocol
            .filter(|protocol| protocol.protocol_id == protocol_id)
            .ok_or(PositionError::ProtocolNotSet)?;
        validate_new_pool(&cfmm, &tokens)?;
        require!(!self.is_initialized(), PositionError::PoolExists);

        self.protocol_id = protocol_id;
        self.cfmm = cfmm;
        self.tokens = tokens;
        self.pool_program = protocol.pool_program;
        self.created_at = created_at;
        self.bump = bump;
        Ok(())
    }
}

/// An owner's standing approval for an operator to move any of its loans
#[account]
#[derive(Debug, Default)]
pub struct OperatorApproval {
    pub owner: Pubkey,
    pub operator: Pubkey,
    pub approved: bool,
    pub bump: u8,
}

impl OperatorApproval {
    pub const SIZE: usize = 8 + // discriminator
        32 + // owner
        32 + // operator
        1 +  // approved
        1;   // bump

    pub fn set(&mut self, owner: Pubkey, operator: Pubkey, approved: bool, bump: u8) -> Result<()> {
        require_keys_neq!(owner, operator, PositionError::InvalidRecipient);
        require_keys_neq!(operator, Pubkey::default(), PositionError::ZeroAddress);
        self.owner = owner;
        self.operator = operator;
        self.approved = approved;
        self.bump = bump;
        Ok(())
    }

    pub fn grants(&self, owner: &Pubkey, operator: &Pubkey) -> bool {
        self.approved && self.owner == *owner && self.operator == *operator
    }
}

/// A leveraged liquidity position
#[account]
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Loan {
    /// Globally unique loan id
    pub id: u64,
    /// Sequence number the loan PDA is derived from
    pub sequence: u64,
    /// Current holder, changed only by a transfer
    pub owner: Pubkey,
    /// Key allowed to transfer this loan; cleared on every transfer
    pub approved: Pubkey,
    /// Backing pool, fixed at creation
    pub pool: Pubkey,
    /// Collateral per pool collateral slot
    pub tokens_held: Vec<u64>,
    /// Outstanding borrowed liquidity in invariant units
    pub liquidity: u128,
    /// Pool shares attributable to the debt
    pub lp_tokens: u64,
    /// Liquidity recorded at the last borrow or repay
    pub init_liquidity: u128,
    /// Caller-supplied correlation tag
    pub ref_id: u16,
    pub created_at: i64,
    pub bump: u8,
}

impl Loan {
    pub fn space(collateral_slots: usize) -> usize {
        8 + // discriminator
        8 +  // id
        8 +  // sequence
        32 + // owner
        32 + // approved
        32 + // pool
        4 + 8 * collateral_slots + // tokens_held
        16 + // liquidity
        8 +  // lp_tokens
        16 + // init_liquidity
        2 +  // ref_id
        8 +  // created_at
        1    // bump
    }

    pub fn new(
        id: u64,
        owner: Pubkey,
        pool: Pubkey,
        collateral_slots: usize,
        ref_id: u16,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            owner,
            pool,
            tokens_held: vec![0; collateral_slots],
            ref_id,
            created_at,
            ..Default::default()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.liquidity == 0
    }

    /// Owner, the approved key, or an operator the owner approved
    pub fn may_transfer(&self, caller: &Pubkey, is_operator: bool) -> bool {
        *caller == self.owner
            || is_operator
            || (self.approved != Pubkey::default() && *caller == self.approved)
    }

    /// Approve `approved` to transfer this loan; the default key revokes
    pub fn approve(&mut self, caller: &Pubkey, is_operator: bool, approved: Pubkey) -> Result<()> {
        require!(
            *caller == self.owner || is_operator,
            PositionError::NotLoanOwner
        );
        require_keys_neq!(approved, self.owner, PositionError::InvalidRecipient);
        self.approved = approved;
        Ok(())
    }

    pub fn record_borrow(&mut self, liquidity: u128, lp_tokens: u64) -> Result<()> {
        self.liquidity = self
            .liquidity
            .checked_add(liquidity)
            .ok_or(PositionError::MathOverflow)?;
        self.lp_tokens = self
            .lp_tokens
            .checked_add(lp_tokens)
            .ok_or(PositionError::MathOverflow)?;
        self.init_liquidity = self.liquidity;
        Ok(())
    }

    /// Reduce the debt by `liquidity_paid`, retiring lp tokens pro rata
    pub fn record_repay(&mut self, liquidity_paid: u128) -> Result<()> {
        require!(
            liquidity_paid <= self.liquidity,
            PositionError::RepayExceedsDebt
        );
        let lp_paid = if liquidity_paid == self.liquidity {
            self.lp_tokens
        } else {
            mul_div(self.lp_tokens, liquidity_paid, self.liquidity)?
        };
        self.liquidity -= liquidity_paid;
        self.lp_tokens -= lp_paid;
        self.init_liquidity = self.liquidity;
        Ok(())
    }
}

/// Address of the loan account with the given sequence number
pub fn loan_address(sequence: u64) -> Pubkey {
    Pubkey::find_program_address(&[LOAN_SEED, &sequence.to_le_bytes()], &crate::ID).0
}

/// One entry of an owner index. `loan_id == 0` marks a tombstone.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexSlot {
    pub loan_id: u64,
    pub loan: Pubkey,
}

impl IndexSlot {
    pub const SIZE: usize = 8 + 32;

    pub fn is_tombstone(&self) -> bool {
        self.loan_id == 0
    }
}

/// Append-only list of the loans an owner has held, either across all pools
/// (`pool == Pubkey::default()`) or within one pool.
///
/// Slots are never removed. A loan transferred away leaves a zeroed slot
/// behind, so readers must skip entries with `loan_id == 0`.
#[account]
#[derive(Debug, Default)]
pub struct LoanIndex {
    pub owner: Pubkey,
    pub pool: Pubkey,
    pub slots: Vec<IndexSlot>,
    pub bump: u8,
}

impl LoanIndex {
    pub fn space(slots: usize) -> usize {
        8 + // discriminator
        32 + // owner
        32 + // pool
        4 + IndexSlot::SIZE * slots + // slots
        1    // bump
    }

    pub fn new(owner: Pubkey, pool: Pubkey) -> Self {
        Self {
            owner,
            pool,
            ..Default::default()
        }
    }

    pub fn append(&mut self, loan_id: u64, loan: Pubkey) {
        self.slots.push(IndexSlot { loan_id, loan });
    }

    /// Zero the live slot holding `loan_id`
    pub fn tombstone(&mut self, loan_id: u64) -> Result<()> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.loan_id == loan_id && loan_id != 0)
            .ok_or(PositionError::UnknownPosition)?;
        *slot = IndexSlot::default();
        Ok(())
    }

    /// Slice semantics: an offset past the end yields nothing and `limit`
    /// only caps the count. Tombstones are returned as they are.
    pub fn page(&self, offset: u64, limit: u64) -> Vec<IndexSlot> {
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        self.slots.iter().skip(start).take(limit).copied().collect()
    }

    pub fn live(&self) -> impl Iterator<Item = &IndexSlot> {
        self.slots.iter().filter(|slot| !slot.is_tombstone())
    }

    /// Whether one more slot fits in an account of `data_len` bytes
    pub fn has_room(&self, data_len: usize) -> bool {
        Self::space(self.slots.len() + 1) <= data_len
    }
}
