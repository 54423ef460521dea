use rust_decimal::{Decimal, RoundingStrategy};

/// Render a price with exactly `precision` decimal places
pub fn format_price(value: Decimal, precision: u32) -> String {
    let mut rounded = value.round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(precision);
    rounded.to_string()
}

/// Signed money amount with two decimals, e.g. `+12.50` / `-3.10`
pub fn format_pnl(value: Decimal) -> String {
    let formatted = format_price(value, 2);
    if value > Decimal::ZERO {
        format!("+{}", formatted)
    } else {
        formatted
    }
}

/// Signed percentage with `precision` decimals, e.g. `+1.25%`
pub fn format_pct(value: f64, precision: usize) -> String {
    if value.is_infinite() {
        return if value > 0.0 { "+inf%".to_string() } else { "-inf%".to_string() };
    }
    format!("{:+.*}%", precision, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_price_pads_and_rounds() {
        assert_eq!(format_price(dec!(97.5), 4), "97.5000");
        assert_eq!(format_price(dec!(0.000123456), 6), "0.000123");
        assert_eq!(format_price(dec!(2.345), 2), "2.35");
        assert_eq!(format_price(dec!(64250), 0), "64250");
    }

    #[test]
    fn test_format_pnl_sign() {
        assert_eq!(format_pnl(dec!(12.5)), "+12.50");
        assert_eq!(format_pnl(dec!(-3.104)), "-3.10");
        assert_eq!(format_pnl(Decimal::ZERO), "0.00");
    }

    #[test]
    fn test_format_pct() {
        assert_eq!(format_pct(1.2345, 2), "+1.23%");
        assert_eq!(format_pct(-0.5, 1), "-0.5%");
        assert_eq!(format_pct(f64::INFINITY, 2), "+inf%");
    }
}
