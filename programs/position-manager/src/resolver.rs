//! Pool resolution and factory validation

use anchor_lang::prelude::*;
use crate::constants::*;
use crate::errors::PositionError;
use crate::state::PoolRecord;

/// A resolved pool, treated as an opaque capability for the rest of a call
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolHandle {
    pub address: Pubkey,
    pub protocol_id: u16,
    pub cfmm: Pubkey,
    pub tokens: Vec<Pubkey>,
    pub pool_program: Pubkey,
}

impl PoolHandle {
    pub fn from_record(address: Pubkey, record: &PoolRecord) -> Self {
        Self {
            address,
            protocol_id: record.protocol_id,
            cfmm: record.cfmm,
            tokens: record.tokens.clone(),
            pool_program: record.pool_program,
        }
    }

    /// Mint of the pool's shares
    pub fn share_mint(&self) -> Pubkey {
        share_mint(&self.address, &self.pool_program).0
    }
}

/// Deterministic pool address for `(protocol_id, cfmm)`, known before the
/// pool exists.
pub fn pool_address(protocol_id: u16, cfmm: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[POOL_SEED, &protocol_id.to_le_bytes(), cfmm.as_ref()],
        &crate::ID,
    )
}

/// Authority PDA a pool program signs with and owns its token vaults by
pub fn pool_authority(pool: &Pubkey, pool_program: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[POOL_AUTHORITY_SEED, pool.as_ref()], pool_program)
}

/// Share mint PDA of a pool, owned by its pool program
pub fn share_mint(pool: &Pubkey, pool_program: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[SHARE_MINT_SEED, pool.as_ref()], pool_program)
}

/// Resolve `(protocol_id, cfmm)` through `lookup`, which returns the pool
/// record stored at an address if there is one.
pub fn resolve<F>(protocol_id: u16, cfmm: &Pubkey, lookup: F) -> Result<PoolHandle>
where
    F: FnOnce(&Pubkey) -> Option<PoolRecord>,
{
    let (address, _) = pool_address(protocol_id, cfmm);
    let record = lookup(&address)
        .filter(|record| record.is_initialized())
        .ok_or(PositionError::PoolNotFound)?;
    require!(
        record.protocol_id == protocol_id && record.cfmm == *cfmm,
        PositionError::PoolNotFound
    );
    Ok(PoolHandle::from_record(address, &record))
}

/// Resolve a pool account passed into an instruction
pub fn resolve_account(info: &AccountInfo) -> Result<PoolHandle> {
    let record = read_pool_record(info).ok_or(PositionError::PoolNotFound)?;
    let (protocol_id, cfmm) = (record.protocol_id, record.cfmm);
    resolve(protocol_id, &cfmm, move |address| {
        (address == info.key).then_some(record)
    })
}

fn read_pool_record(info: &AccountInfo) -> Option<PoolRecord> {
    if info.owner != &crate::ID || info.data_is_empty() {
        return None;
    }
    let data = info.try_borrow_data().ok()?;
    PoolRecord::try_deserialize(&mut &data[..]).ok()
}

/// Parameter checks shared by every pool creation
pub fn validate_new_pool(cfmm: &Pubkey, tokens: &[Pubkey]) -> Result<()> {
    require!(
        (MIN_POOL_TOKENS..=MAX_POOL_TOKENS).contains(&tokens.len()),
        PositionError::InvalidTokenCount
    );
    require_keys_neq!(*cfmm, Pubkey::default(), PositionError::ZeroAddress);
    for (i, token) in tokens.iter().enumerate() {
        require_keys_neq!(*token, Pubkey::default(), PositionError::ZeroAddress);
        require!(
            !tokens[..i].contains(token),
            PositionError::IdenticalAssets
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(protocol_id: u16, cfmm: Pubkey) -> PoolRecord {
        PoolRecord {
            protocol_id,
            cfmm,
            tokens: vec![Pubkey::new_unique(), Pubkey::new_unique()],
            pool_program: Pubkey::new_unique(),
            created_at: 0,
            bump: 0,
        }
    }

    #[test]
    fn address_is_deterministic() {
        let cfmm = Pubkey::new_unique();
        assert_eq!(pool_address(1, &cfmm), pool_address(1, &cfmm));
        assert_ne!(pool_address(1, &cfmm).0, pool_address(2, &cfmm).0);
    }

    #[test]
    fn resolves_a_registered_pool() {
        let cfmm = Pubkey::new_unique();
        let stored = record(1, cfmm);
        let (expected, _) = pool_address(1, &cfmm);
        let handle = resolve(1, &cfmm, |address| {
            (*address == expected).then(|| stored.clone())
        })
        .unwrap();
        assert_eq!(handle.address, expected);
        assert_eq!(handle.tokens, stored.tokens);
    }

    #[test]
    fn missing_pool_is_not_found() {
        let cfmm = Pubkey::new_unique();
        let err = resolve(1, &cfmm, |_| None).unwrap_err();
        assert_eq!(err, PositionError::PoolNotFound.into());
    }

    #[test]
    fn record_for_another_cfmm_is_not_found() {
        let cfmm = Pubkey::new_unique();
        let other = record(1, Pubkey::new_unique());
        let err = resolve(1, &cfmm, |_| Some(other)).unwrap_err();
        assert_eq!(err, PositionError::PoolNotFound.into());
    }

    #[test]
    fn new_pool_validation() {
        let cfmm = Pubkey::new_unique();
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();

        assert!(validate_new_pool(&cfmm, &[a, b]).is_ok());
        assert_eq!(
            validate_new_pool(&cfmm, &[a, a]).unwrap_err(),
            PositionError::IdenticalAssets.into()
        );
        assert_eq!(
            validate_new_pool(&cfmm, &[a, Pubkey::default()]).unwrap_err(),
            PositionError::ZeroAddress.into()
        );
        assert_eq!(
            validate_new_pool(&Pubkey::default(), &[a, b]).unwrap_err(),
            PositionError::ZeroAddress.into()
        );
        assert_eq!(
            validate_new_pool(&cfmm, &[a]).unwrap_err(),
            PositionError::InvalidTokenCount.into()
        );
    }
}
