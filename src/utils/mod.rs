//! Utility functions for formatting and common operations
//!
//! This module provides centralized formatting utilities for consistent
//! display of EUR amounts and quantities throughout the application.

use rust_decimal::{Decimal, RoundingStrategy};

/// Currency symbol options for formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencySymbol {
    /// Append " €"
    Eur,
    /// No currency symbol (for table cells, CSV export)
    None,
}

/// Core formatting function with full control over output.
///
/// Formats a Decimal value using European conventions, rounded half away
/// from zero to cents:
/// - Thousands separator: `.` (period)
/// - Decimal separator: `,` (comma)
///
/// # Examples
/// ```
/// use fincli::utils::{format_currency_with_width, CurrencySymbol};
/// use rust_decimal_macros::dec;
///
/// assert_eq!(
///     format_currency_with_width(dec!(1234.56), 0, CurrencySymbol::Eur),
///     "1.234,56 €"
/// );
///
/// assert_eq!(
///     format_currency_with_width(dec!(1234), 12, CurrencySymbol::None),
///     "    1.234,00"
/// );
/// ```
pub fn format_currency_with_width(value: Decimal, width: usize, symbol: CurrencySymbol) -> String {
    let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let is_negative = rounded < Decimal::ZERO;

    let formatted = format!("{:.2}", rounded.abs());
    let (integer_part, decimal_part) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    // Add thousands separators (.) to integer part
    let digits: Vec<char> = integer_part.chars().collect();
    let mut with_separators = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            with_separators.push('.');
        }
        with_separators.push(*c);
    }

    let sign = if is_negative { "-" } else { "" };
    let suffix = match symbol {
        CurrencySymbol::Eur => " €",
        CurrencySymbol::None => "",
    };

    let result = format!("{}{},{}{}", sign, with_separators, decimal_part, suffix);

    // Apply width padding (right-align)
    let len = result.chars().count();
    if width > len {
        format!("{}{}", " ".repeat(width - len), result)
    } else {
        result
    }
}

// ============ Convenience functions ============

/// Format as euros: "1.234,56 €"
///
/// # Examples
/// ```
/// use fincli::utils::format_eur;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_eur(dec!(1234.56)), "1.234,56 €");
/// assert_eq!(format_eur(dec!(-500)), "-500,00 €");
/// ```
pub fn format_eur(value: Decimal) -> String {
    format_currency_with_width(value, 0, CurrencySymbol::Eur)
}

/// Format number only (no symbol): "1.234,56"
pub fn format_amount(value: Decimal) -> String {
    format_currency_with_width(value, 0, CurrencySymbol::None)
}

/// Quantities keep their own precision, without trailing zeros
///
/// # Examples
/// ```
/// use fincli::utils::format_quantity;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_quantity(dec!(12.500)), "12.5");
/// assert_eq!(format_quantity(dec!(3)), "3");
/// ```
pub fn format_quantity(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Plain two-decimal string for machine-readable output
pub fn decimal_2dp(value: Decimal) -> String {
    format!(
        "{:.2}",
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_eur_basic() {
        assert_eq!(format_eur(dec!(1234.56)), "1.234,56 €");
        assert_eq!(format_eur(dec!(0.99)), "0,99 €");
        assert_eq!(format_eur(dec!(1000000)), "1.000.000,00 €");
    }

    #[test]
    fn test_format_eur_small_values() {
        assert_eq!(format_eur(dec!(0)), "0,00 €");
        assert_eq!(format_eur(dec!(0.01)), "0,01 €");
        assert_eq!(format_eur(dec!(123)), "123,00 €");
        assert_eq!(format_eur(dec!(999.99)), "999,99 €");
    }

    #[test]
    fn test_format_eur_large_values() {
        assert_eq!(format_eur(dec!(12345)), "12.345,00 €");
        assert_eq!(format_eur(dec!(123456)), "123.456,00 €");
        assert_eq!(format_eur(dec!(12345678.90)), "12.345.678,90 €");
    }

    #[test]
    fn test_format_eur_negative() {
        assert_eq!(format_eur(dec!(-1234.56)), "-1.234,56 €");
        assert_eq!(format_eur(dec!(-0.01)), "-0,01 €");
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        assert_eq!(format_eur(dec!(1.005)), "1,01 €");
        assert_eq!(format_eur(dec!(-1.005)), "-1,01 €");
        assert_eq!(format_eur(dec!(1.234)), "1,23 €");
        // Rounds to zero without a stray sign
        assert_eq!(format_eur(dec!(-0.001)), "0,00 €");
    }

    #[test]
    fn test_format_with_width() {
        let result = format_currency_with_width(dec!(100), 12, CurrencySymbol::Eur);
        assert_eq!(result, "    100,00 €");
        assert_eq!(format_amount(dec!(1234.5)), "1.234,50");
    }

    #[test]
    fn test_decimal_2dp() {
        assert_eq!(decimal_2dp(dec!(15)), "15.00");
        assert_eq!(decimal_2dp(dec!(0.125)), "0.13");
    }
}
