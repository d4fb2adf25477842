//! Invoice pricing.
//!
//! Pure functions over line snapshots. Nothing here rounds; presentation
//! decides how many places to show.

use crate::models::LineItem;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

/// Computed totals for a set of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pricing {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
}

/// Subtotal is the sum of `unit_price * quantity`; the discount is a
/// percentage of the subtotal. A negative discount counts as zero.
///
/// Returns `None` when an amount is too large to represent.
pub fn compute(lines: &[LineItem], discount_percent: Decimal) -> Option<Pricing> {
    let mut subtotal = Decimal::ZERO;
    for line in lines {
        subtotal = subtotal.checked_add(line.amount()?)?;
    }
    let discount = discount_percent.max(Decimal::ZERO);
    let discount_amount = subtotal
        .checked_mul(discount)?
        .checked_div(Decimal::ONE_HUNDRED)?;

    Some(Pricing {
        subtotal,
        discount_amount,
        total: subtotal.checked_sub(discount_amount)?,
    })
}

/// Relative tolerance of 1e-6, absolute below a magnitude of one.
pub fn matches_declared(declared: Decimal, computed: Decimal) -> bool {
    let scale = computed.abs().max(Decimal::ONE);
    (declared - computed).abs() <= Decimal::new(1, 6) * scale
}

/// Lenient discount parsing for free-form input. Anything that is not a
/// number becomes zero, as does a negative value.
pub fn parse_discount(raw: &str) -> Decimal {
    Decimal::from_str(raw.trim())
        .unwrap_or(Decimal::ZERO)
        .max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn line(unit_price: i64, quantity: i64) -> LineItem {
        LineItem {
            product_id: Uuid::new_v4(),
            name: "Item".to_string(),
            quantity,
            unit_price: Decimal::from(unit_price),
        }
    }

    #[test]
    fn fifteen_percent_off_two_lines() {
        let pricing = compute(&[line(10, 2), line(5, 1)], Decimal::from(15)).unwrap();
        assert_eq!(pricing.subtotal, Decimal::from(25));
        assert_eq!(pricing.discount_amount, Decimal::new(375, 2));
        assert_eq!(pricing.total, Decimal::new(2125, 2));
    }

    #[test]
    fn negative_discount_is_ignored() {
        let pricing = compute(&[line(8, 3)], Decimal::from(-20)).unwrap();
        assert_eq!(pricing.discount_amount, Decimal::ZERO);
        assert_eq!(pricing.total, Decimal::from(24));
    }

    #[test]
    fn empty_lines_price_to_zero() {
        let pricing = compute(&[], Decimal::from(15)).unwrap();
        assert_eq!(pricing.total, Decimal::ZERO);
    }

    #[test]
    fn same_input_same_output() {
        let lines = [line(7, 3), line(11, 2)];
        assert_eq!(
            compute(&lines, Decimal::from(12)),
            compute(&lines, Decimal::from(12))
        );
    }

    #[test]
    fn unrepresentable_amounts_are_refused() {
        let mut huge = line(1, i64::MAX);
        huge.unit_price = Decimal::MAX;
        assert_eq!(huge.amount(), None);
        assert_eq!(compute(&[huge], Decimal::from(15)), None);

        let mut big = line(1, 5);
        big.unit_price = Decimal::from(i64::MAX) * Decimal::from(1_000_000_000i64);
        assert!(big.amount().is_some());
        assert_eq!(compute(&[big.clone(), big], Decimal::ZERO), None);
    }

    #[test]
    fn declared_total_tolerance() {
        let computed = Decimal::new(2125, 2);
        assert!(matches_declared(Decimal::new(2125, 2), computed));
        assert!(matches_declared(Decimal::new(212500001, 7), computed));
        assert!(!matches_declared(Decimal::new(2126, 2), computed));
        // Below one the tolerance is absolute.
        assert!(matches_declared(Decimal::new(5, 7), Decimal::ZERO));
        assert!(!matches_declared(Decimal::new(2, 6), Decimal::ZERO));
    }

    #[test]
    fn parse_discount_is_lenient() {
        assert_eq!(parse_discount("12.5"), Decimal::new(125, 1));
        assert_eq!(parse_discount(" 15 "), Decimal::from(15));
        assert_eq!(parse_discount("ten"), Decimal::ZERO);
        assert_eq!(parse_discount(""), Decimal::ZERO);
        assert_eq!(parse_discount("-3"), Decimal::ZERO);
    }
}
