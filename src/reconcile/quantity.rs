// Quantity rules shared by both passes
//
// Transfers: the observed asset must render exactly as `<quantity>.0000 <token>`.
// Admin calls: the EVM value is floored to 10^17 base units (0.1 token) and
// may fall short of the expected amount by at most one such unit, which the
// bridge keeps back as a gas reserve.

use crate::codec::{Asset, DecodeError};
use crate::types::ExpectedRecord;
use alloy_primitives::U256;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// 10^17 base units: one tenth of a token at 18 EVM decimals
pub const EVM_PRECISION: U256 = U256::from_limbs([100_000_000_000_000_000, 0, 0, 0]);

/// Expected whole-token quantities are multiplied by this to line up with
/// [`EVM_PRECISION`] units.
pub const EXPECTED_SCALE: i128 = 10;

/// Shortfall (in [`EVM_PRECISION`] units) tolerated for the gas reserve
pub const GAS_RESERVE_TOLERANCE: u64 = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("quantity {0:?} is not a base-10 integer")]
    NotAnInteger(String),
}

/// The asset string a matching transfer must render as.
pub fn format_expected_asset(quantity: &str, token: &str) -> String {
    format!("{quantity}.0000 {token}")
}

/// Exact string equality against the fixed-point rendering.
pub fn transfer_matches(record: &ExpectedRecord, observed: &Asset) -> bool {
    observed.to_string() == format_expected_asset(&record.quantity, &record.token)
}

/// Observed minus expected, when the expected quantity is numeric.
pub fn transfer_difference(record: &ExpectedRecord, observed: &Asset) -> Option<Decimal> {
    let expected = Decimal::from_str(&record.quantity).ok()?;
    observed.to_decimal().checked_sub(expected)
}

/// `floor(value / 10^17)` with `value` read as a big-endian unsigned integer.
pub fn scaled_evm_value(value: &[u8]) -> Result<U256, DecodeError> {
    let value = U256::try_from_be_slice(value).ok_or(DecodeError::ValueTooLarge(value.len()))?;
    Ok(value / EVM_PRECISION)
}

/// Expected quantity parsed as i64 and scaled by [`EXPECTED_SCALE`].
pub fn scaled_expected(quantity: &str) -> Result<i128, QuantityError> {
    let balance: i64 = quantity
        .trim()
        .parse()
        .map_err(|_| QuantityError::NotAnInteger(quantity.to_string()))?;
    Ok(i128::from(balance) * EXPECTED_SCALE)
}

/// Reject only an underpayment larger than [`GAS_RESERVE_TOLERANCE`];
/// overpayment is always accepted.
pub fn within_gas_reserve(expected: i128, observed: U256) -> bool {
    // Non-positive expectations can never be underpaid
    let Ok(expected) = u128::try_from(expected) else {
        return true;
    };
    let expected = U256::from(expected);

    if expected <= observed {
        return true;
    }
    expected - observed <= U256::from(GAS_RESERVE_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(quantity: &str) -> ExpectedRecord {
        ExpectedRecord {
            tx_id: "tx".into(),
            address: "0xabc".into(),
            quantity: quantity.into(),
            token: "EOS".into(),
        }
    }

    fn asset(s: &str) -> Asset {
        s.parse().unwrap()
    }

    /// Big-endian wei for `tenths` tenths of a token
    fn wei_tenths(tenths: u64) -> Vec<u8> {
        (U256::from(tenths) * EVM_PRECISION).to_be_bytes::<32>().to_vec()
    }

    #[test]
    fn formats_expected_asset() {
        assert_eq!(format_expected_asset("100", "EOS"), "100.0000 EOS");
    }

    #[test]
    fn transfer_exact_match() {
        assert!(transfer_matches(&record("100"), &asset("100.0000 EOS")));
    }

    #[test]
    fn transfer_fractional_difference_is_mismatch() {
        let observed = asset("100.0001 EOS");
        assert!(!transfer_matches(&record("100"), &observed));
        assert_eq!(transfer_difference(&record("100"), &observed), Some(dec!(0.0001)));
    }

    #[test]
    fn transfer_symbol_and_precision_must_match() {
        assert!(!transfer_matches(&record("100"), &asset("100.0000 USDT")));
        assert!(!transfer_matches(&record("100"), &asset("100.00 EOS")));
    }

    #[test]
    fn evm_value_is_floored() {
        let mut raw = U256::from(1000u64) * EVM_PRECISION;
        raw += U256::from(99_999_999_999_999_999u64);
        let bytes = raw.to_be_bytes::<32>();
        assert_eq!(scaled_evm_value(&bytes).unwrap(), U256::from(1000u64));
    }

    #[test]
    fn evm_value_accepts_short_and_empty_encodings() {
        assert_eq!(scaled_evm_value(&[]).unwrap(), U256::ZERO);
        let full = (U256::from(5u64) * EVM_PRECISION).to_be_bytes::<32>();
        let start = full.iter().position(|&b| b != 0).unwrap_or(full.len());
        assert_eq!(scaled_evm_value(&full[start..]).unwrap(), U256::from(5u64));
    }

    #[test]
    fn evm_value_wider_than_256_bits_is_rejected() {
        assert_eq!(
            scaled_evm_value(&[1u8; 33]),
            Err(DecodeError::ValueTooLarge(33))
        );
    }

    #[test]
    fn expected_is_scaled_by_ten() {
        assert_eq!(scaled_expected("100"), Ok(1000));
        assert_eq!(scaled_expected(" 7 "), Ok(70));
        assert!(scaled_expected("1.5").is_err());
        assert!(scaled_expected("").is_err());
    }

    #[test]
    fn gas_reserve_tolerance() {
        // expected=100, observed=100 / 99 / 98 / overpaid
        assert!(within_gas_reserve(100, U256::from(100u64)));
        assert!(within_gas_reserve(100, U256::from(99u64)));
        assert!(!within_gas_reserve(100, U256::from(98u64)));
        assert!(within_gas_reserve(90, U256::from(100u64)));
    }

    #[test]
    fn gas_reserve_with_scaled_amounts() {
        let expected = scaled_expected("100").unwrap();
        let exact = scaled_evm_value(&wei_tenths(1000)).unwrap();
        let reserve = scaled_evm_value(&wei_tenths(999)).unwrap();
        let short = scaled_evm_value(&wei_tenths(998)).unwrap();

        assert!(within_gas_reserve(expected, exact));
        assert!(within_gas_reserve(expected, reserve));
        assert!(!within_gas_reserve(expected, short));
    }

    #[test]
    fn huge_observed_value_is_overpayment() {
        assert!(within_gas_reserve(i64::MAX as i128 * 10, U256::MAX / EVM_PRECISION));
    }
}
