//! Inventory ratio and quote skew.

use crate::utils::decimal::safe_div;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Bounded price skew for an inventory ratio.
///
/// `(ratio - target) * 2 * intensity`, clamped to `[-max_skew, max_skew]`.
/// Positive skew means the account holds too much base, so quotes should
/// shift down to encourage selling.
pub fn skew(ratio: Decimal, target: Decimal, max_skew: Decimal, intensity: Decimal) -> Decimal {
    let bound = max_skew.abs();
    let raw = (ratio - target) * dec!(2) * intensity;
    raw.clamp(-bound, bound)
}

/// Spot balances of one subaccount on one pair, recomputed every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryState {
    pub base: Decimal,
    pub quote: Decimal,
    /// Base value in quote units divided by total value
    pub ratio: Decimal,
}

impl InventoryState {
    /// Derive the inventory ratio at `price`. An empty account is balanced.
    pub fn from_balances(base: Decimal, quote: Decimal, price: Decimal) -> Self {
        let base_value = base * price;
        let total = base_value + quote;
        let ratio = if total.is_zero() {
            dec!(0.5)
        } else {
            safe_div(base_value, total)
        };
        Self { base, quote, ratio }
    }

    pub fn total_value(&self, price: Decimal) -> Decimal {
        self.base * price + self.quote
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skew_is_bounded() {
        let max = dec!(0.03);
        let mut ratio = Decimal::ZERO;
        while ratio <= Decimal::ONE {
            let s = skew(ratio, dec!(0.5), max, Decimal::ONE);
            assert!(s.abs() <= max, "ratio {ratio} gave skew {s}");
            ratio += dec!(0.05);
        }
    }

    #[test]
    fn test_skew_sign_and_scale() {
        // 0.6 vs 0.5 with intensity 0.05: 0.1 * 2 * 0.05 = 0.01
        assert_eq!(skew(dec!(0.6), dec!(0.5), dec!(0.05), dec!(0.05)), dec!(0.01));
        assert_eq!(skew(dec!(0.4), dec!(0.5), dec!(0.05), dec!(0.05)), dec!(-0.01));
        assert_eq!(skew(dec!(0.5), dec!(0.5), dec!(0.05), dec!(0.05)), Decimal::ZERO);
        // all base, intensity 1: clamps to the bound
        assert_eq!(skew(Decimal::ONE, dec!(0.5), dec!(0.03), Decimal::ONE), dec!(0.03));
        assert_eq!(skew(Decimal::ZERO, dec!(0.5), dec!(0.03), Decimal::ONE), dec!(-0.03));
    }

    #[test]
    fn test_inventory_ratio() {
        let inv = InventoryState::from_balances(dec!(1), dec!(100), dec!(100));
        assert_eq!(inv.ratio, dec!(0.5));
        assert_eq!(inv.total_value(dec!(100)), dec!(200));

        let heavy = InventoryState::from_balances(dec!(3), dec!(100), dec!(100));
        assert_eq!(heavy.ratio, dec!(0.75));
    }

    #[test]
    fn test_empty_account_is_balanced() {
        let inv = InventoryState::from_balances(Decimal::ZERO, Decimal::ZERO, dec!(100));
        assert_eq!(inv.ratio, dec!(0.5));
    }
}
