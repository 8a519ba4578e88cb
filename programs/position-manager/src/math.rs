use anchor_lang::prelude::*;
use crate::errors::PositionError;

/// Element-wise `actual[i] >= minimum[i]`.
///
/// Equal values pass. A shorter `minimum` leaves the trailing assets
/// unchecked, and a `minimum` longer than `actual` compares the missing
/// actual entries as zero.
pub fn meets_minimums(actual: &[u64], minimum: &[u64]) -> bool {
    minimum
        .iter()
        .enumerate()
        .all(|(i, min)| actual.get(i).copied().unwrap_or(0) >= *min)
}

/// Slippage guard. Fails with `AmountsMin` when any amount falls short.
pub fn check_min_amounts(actual: &[u64], minimum: &[u64]) -> Result<()> {
    require!(meets_minimums(actual, minimum), PositionError::AmountsMin);
    Ok(())
}

/// Add two equally indexed amount vectors, padding the shorter with zeros
pub fn add_amounts(held: &[u64], amounts: &[u64]) -> Result<Vec<u64>> {
    let len = held.len().max(amounts.len());
    (0..len)
        .map(|i| {
            let a = held.get(i).copied().unwrap_or(0);
            let b = amounts.get(i).copied().unwrap_or(0);
            a.checked_add(b).ok_or_else(|| error!(PositionError::MathOverflow))
        })
        .collect()
}

/// Subtract `amounts` from `held` slot by slot.
/// Fails with `InsufficientCollateral` rather than going below zero.
pub fn sub_amounts(held: &[u64], amounts: &[u64]) -> Result<Vec<u64>> {
    require!(amounts.len() <= held.len(), PositionError::InvalidAmountsLength);
    held.iter()
        .enumerate()
        .map(|(i, a)| {
            let b = amounts.get(i).copied().unwrap_or(0);
            a.checked_sub(b)
                .ok_or_else(|| error!(PositionError::InsufficientCollateral))
        })
        .collect()
}

/// `value * numerator / denominator` in u128 without intermediate overflow
pub fn mul_div(value: u64, numerator: u128, denominator: u128) -> Result<u64> {
    require!(denominator > 0, PositionError::MathOverflow);
    let product = (value as u128)
        .checked_mul(numerator)
        .ok_or(PositionError::MathOverflow)?;
    let quotient = product
        .checked_div(denominator)
        .ok_or(PositionError::MathOverflow)?;
    u64::try_from(quotient).map_err(|_| error!(PositionError::MathOverflow))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn equal_amounts_pass() {
        assert!(check_min_amounts(&[10, 20], &[10, 20]).is_ok());
    }

    #[test]
    fn one_short_amount_fails() {
        let err = check_min_amounts(&[10, 19], &[10, 20]).unwrap_err();
        assert_eq!(err, PositionError::AmountsMin.into());
    }

    #[test]
    fn empty_minimum_always_passes() {
        assert!(check_min_amounts(&[], &[]).is_ok());
        assert!(check_min_amounts(&[0, 0], &[]).is_ok());
    }

    #[test]
    fn trailing_minimums_may_be_omitted() {
        assert!(check_min_amounts(&[5, 0, 0], &[5]).is_ok());
    }

    #[test]
    fn longer_minimum_checks_missing_amounts_as_zero() {
        assert!(check_min_amounts(&[100, 10], &[100, 10, 0, 0, 0, 0]).is_ok());
        assert!(check_min_amounts(&[100, 10], &[100, 10, 1]).is_err());
    }

    #[test]
    fn sub_amounts_rejects_overdraw() {
        assert_eq!(sub_amounts(&[10, 5], &[10, 5]).unwrap(), vec![0, 0]);
        let err = sub_amounts(&[10, 5], &[11]).unwrap_err();
        assert_eq!(err, PositionError::InsufficientCollateral.into());
    }

    #[test]
    fn add_amounts_pads_to_longest() {
        assert_eq!(add_amounts(&[1, 2, 3], &[10]).unwrap(), vec![11, 2, 3]);
    }

    #[test]
    fn mul_div_rounds_down() {
        assert_eq!(mul_div(100, 1, 3).unwrap(), 33);
        assert!(mul_div(1, 1, 0).is_err());
    }

    proptest! {
        #[test]
        fn guard_boundary_is_inclusive(amounts in proptest::collection::vec(any::<u64>(), 0..8)) {
            prop_assert!(meets_minimums(&amounts, &amounts));
        }

        #[test]
        fn any_shortfall_is_rejected(
            amounts in proptest::collection::vec(0u64..u64::MAX, 1..8),
            index in any::<prop::sample::Index>(),
        ) {
            let mut minimum = amounts.clone();
            let i = index.index(minimum.len());
            minimum[i] = amounts[i] + 1;
            prop_assert!(!meets_minimums(&amounts, &minimum));
        }
    }
}
