//! Minor-currency-unit helpers.
//!
//! All stored monetary values are integer cents. Conversion to a two-decimal
//! display string happens exactly once, at the API boundary, through
//! [`format_minor_units`].

/// Formats an amount of minor currency units as a two-decimal string,
/// e.g. `1999` -> `"19.99"`.
pub fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Line total in minor units. Quantities are validated to be small positive
/// integers well before this point, so the i64 product cannot overflow for
/// any realistic catalog price.
pub fn line_total(unit_price: i64, quantity: i32) -> i64 {
    unit_price * quantity as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn formats_two_decimals() {
        assert_eq!(format_minor_units(0), "0.00");
        assert_eq!(format_minor_units(5), "0.05");
        assert_eq!(format_minor_units(100), "1.00");
        assert_eq!(format_minor_units(1999), "19.99");
        assert_eq!(format_minor_units(2000), "20.00");
        assert_eq!(format_minor_units(-150), "-1.50");
    }

    #[test]
    fn line_totals_are_exact() {
        assert_eq!(line_total(500, 2), 1000);
        assert_eq!(line_total(1000, 1), 1000);
        assert_eq!(line_total(333, 3), 999);
    }

    proptest! {
        #[test]
        fn no_drift_for_any_price(unit in 0i64..10_000_000, qty in 1i32..1_000) {
            let total = line_total(unit, qty);
            prop_assert_eq!(total, unit.checked_mul(qty as i64).unwrap());
        }

        #[test]
        fn formatted_string_round_trips(amount in 0i64..1_000_000_000) {
            let s = format_minor_units(amount);
            let (whole, frac) = s.split_once('.').unwrap();
            prop_assert_eq!(frac.len(), 2);
            let parsed = whole.parse::<i64>().unwrap() * 100 + frac.parse::<i64>().unwrap();
            prop_assert_eq!(parsed, amount);
        }
    }
}
