//! Decimal arithmetic utilities for financial calculations.
//!
//! All rounding happens on `Decimal`; floating point never enters the price
//! or size path. Fixed-point integers are the on-chain representation, where a
//! token with `decimals = 6` stores `1.5` as `1_500_000`.

use crate::error::{EngineError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::str::FromStr;

/// Round `value` to the nearest multiple of `granularity`.
///
/// The result carries exactly as many decimal places as `granularity`
/// implies (`0.01` gives 2, `1` gives 0). A zero granularity returns the
/// value untouched. Midpoints round away from zero.
pub fn quantize_decimal(value: Decimal, granularity: Decimal) -> Decimal {
    let granularity = granularity.abs();
    if granularity.is_zero() {
        return value;
    }
    let places = granularity.normalize().scale();
    let steps = (value / granularity)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let mut quantized = steps * granularity;
    quantized.rescale(places);
    quantized
}

/// String form of [`quantize_decimal`], as submitted to the exchange.
pub fn quantize(value: Decimal, granularity: Decimal) -> String {
    if granularity.is_zero() {
        return value.normalize().to_string();
    }
    quantize_decimal(value, granularity).to_string()
}

/// Quantize a decimal string such as `"10.567"`.
pub fn quantize_str(value: &str, granularity: Decimal) -> Result<String> {
    let parsed = Decimal::from_str(value.trim())
        .map_err(|e| EngineError::FixedPoint(format!("`{value}` is not a decimal: {e}")))?;
    Ok(quantize(parsed, granularity))
}

/// Quantize a fixed-point integer carrying `decimals` implied places.
pub fn quantize_fixed(raw: u128, decimals: u32, granularity: Decimal) -> Result<String> {
    Ok(quantize(from_fixed_point(raw, decimals)?, granularity))
}

/// Quantize an order size. Sizes are never negative, so anything that rounds
/// below zero is clamped to zero.
pub fn quantize_size(size: Decimal, step_size: Decimal) -> Decimal {
    let quantized = quantize_decimal(size, step_size);
    if quantized.is_sign_negative() {
        Decimal::ZERO
    } else {
        quantized
    }
}

/// Round down to lot size, for selling no more than is held.
pub fn round_down_to_lot(value: Decimal, lot_size: Decimal) -> Decimal {
    if lot_size == Decimal::ZERO {
        return value;
    }
    (value / lot_size).floor() * lot_size
}

/// Convert a human decimal into a fixed-point integer with `decimals` places.
///
/// Fails instead of truncating when the value has more fractional digits than
/// the token supports, or when it is negative.
pub fn to_fixed_point(value: Decimal, decimals: u32) -> Result<u128> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(EngineError::FixedPoint(format!(
            "negative amount {value} has no fixed-point form"
        )));
    }
    let value = value.normalize();
    if value.scale() > decimals {
        return Err(EngineError::FixedPoint(format!(
            "{value} has more than {decimals} decimal places"
        )));
    }
    let factor = 10u128
        .checked_pow(decimals - value.scale())
        .ok_or_else(|| EngineError::FixedPoint(format!("10^{decimals} overflows")))?;
    let mantissa = u128::try_from(value.mantissa().abs())
        .map_err(|e| EngineError::FixedPoint(e.to_string()))?;
    mantissa
        .checked_mul(factor)
        .ok_or_else(|| EngineError::FixedPoint(format!("{value} overflows at {decimals} decimals")))
}

/// Convert a fixed-point integer back into a decimal.
pub fn from_fixed_point(raw: u128, decimals: u32) -> Result<Decimal> {
    let raw = i128::try_from(raw)
        .map_err(|_| EngineError::FixedPoint(format!("{raw} exceeds i128")))?;
    from_fixed_point_signed(raw, decimals)
}

/// Signed variant used for funding rates and PnL figures.
pub fn from_fixed_point_signed(raw: i128, decimals: u32) -> Result<Decimal> {
    Decimal::try_from_i128_with_scale(raw, decimals)
        .map(|d| d.normalize())
        .map_err(|e| EngineError::FixedPoint(format!("{raw} at {decimals} decimals: {e}")))
}

/// Round `value` to `decimals` places, truncating toward zero.
pub fn truncate_to_decimals(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
}

/// Relative distance between two values (`|a - b| / b`).
pub fn relative_diff(a: Decimal, b: Decimal) -> Decimal {
    if b == Decimal::ZERO {
        return Decimal::ZERO;
    }
    ((a - b) / b).abs()
}

/// Convert a percentage to basis points (1% = 100 bp).
pub fn percent_to_bps(percent: Decimal) -> Decimal {
    percent * dec!(100)
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_examples() {
        assert_eq!(quantize(dec!(10.567), dec!(0.01)), "10.57");
        assert_eq!(quantize(dec!(10.567), dec!(1)), "11");
        assert_eq!(quantize(dec!(10.567), dec!(0)), "10.567");
    }

    #[test]
    fn test_quantize_odd_granularity() {
        assert_eq!(quantize(dec!(10.567), dec!(0.05)), "10.55");
        assert_eq!(quantize(dec!(10.567), dec!(0.5)), "10.5");
        assert_eq!(quantize(dec!(50123.456), dec!(0.10)), "50123.5");
        // trailing zeros in the tick do not add places
        assert_eq!(quantize(dec!(1.2), dec!(0.010)), "1.20");
    }

    #[test]
    fn test_quantize_result_is_multiple_of_tick() {
        let tick = dec!(0.25);
        for raw in [dec!(99.13), dec!(100.874), dec!(0.12), dec!(7)] {
            let q = quantize_decimal(raw, tick);
            assert_eq!(q % tick, Decimal::ZERO, "{q} not a multiple of {tick}");
        }
    }

    #[test]
    fn test_quantize_input_forms_agree() {
        let tick = dec!(0.01);
        let from_decimal = quantize(dec!(10.567), tick);
        let from_str = quantize_str("10.567", tick).unwrap();
        let from_fixed = quantize_fixed(10_567_000, 6, tick).unwrap();
        assert_eq!(from_decimal, from_str);
        assert_eq!(from_decimal, from_fixed);
        assert_eq!(quantize(Decimal::from(11u32), dec!(1)), "11");
    }

    #[test]
    fn test_quantize_str_rejects_garbage() {
        assert!(quantize_str("ten", dec!(0.01)).is_err());
    }

    #[test]
    fn test_quantize_size_never_negative() {
        assert_eq!(quantize_size(dec!(-0.4), dec!(1)), Decimal::ZERO);
        assert_eq!(quantize_size(dec!(0.0049), dec!(0.01)), dec!(0.00));
        assert_eq!(quantize_size(dec!(1.567), dec!(0.001)), dec!(1.567));
    }

    #[test]
    fn test_round_down_to_lot() {
        assert_eq!(round_down_to_lot(dec!(1.567), dec!(0.001)), dec!(1.567));
        assert_eq!(round_down_to_lot(dec!(1.567), dec!(0.01)), dec!(1.56));
        assert_eq!(round_down_to_lot(dec!(1.567), dec!(0.1)), dec!(1.5));
    }

    #[test]
    fn test_fixed_point_conversion() {
        assert_eq!(to_fixed_point(dec!(1.5), 6).unwrap(), 1_500_000);
        assert_eq!(to_fixed_point(dec!(0), 18).unwrap(), 0);
        assert_eq!(
            to_fixed_point(dec!(65000.25), 18).unwrap(),
            65_000_250_000_000_000_000_000
        );
        assert_eq!(from_fixed_point(1_500_000, 6).unwrap(), dec!(1.5));
        assert_eq!(
            from_fixed_point(65_000_250_000_000_000_000_000, 18).unwrap(),
            dec!(65000.25)
        );
    }

    #[test]
    fn test_fixed_point_rejects_lossy_input() {
        assert!(to_fixed_point(dec!(1.1234567), 6).is_err());
        assert!(to_fixed_point(dec!(-1), 6).is_err());
        // trailing zeros beyond the token precision are harmless
        assert_eq!(to_fixed_point(dec!(1.1000000), 6).unwrap(), 1_100_000);
    }

    #[test]
    fn test_signed_fixed_point() {
        assert_eq!(
            from_fixed_point_signed(100_000_000_000_000, 18).unwrap(),
            dec!(0.0001)
        );
        assert_eq!(
            from_fixed_point_signed(-50_000_000_000_000, 18).unwrap(),
            dec!(-0.00005)
        );
    }

    #[test]
    fn test_relative_diff_and_bps() {
        assert_eq!(relative_diff(dec!(100.4), dec!(100)), dec!(0.004));
        assert_eq!(relative_diff(dec!(1), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(percent_to_bps(dec!(1)), dec!(100));
        assert_eq!(percent_to_bps(dec!(0.5)), dec!(50));
    }

    #[test]
    fn test_truncate_and_safe_div() {
        assert_eq!(truncate_to_decimals(dec!(1.23456789), 6), dec!(1.234567));
        assert_eq!(safe_div(dec!(1), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(safe_div(dec!(1), dec!(4)), dec!(0.25));
    }
}
