//! Money Conversion Module
//!
//! Unified conversion between the internal `Cents` representation and the
//! client-facing euro string/Decimal representation. All conversions MUST go
//! through this module.
//!
//! ## Internal Representation
//! - All amounts are stored as integer euro cents (`Cents = i64`)
//! - The scale factor is fixed at 10^2 (EUR has 2 minor-unit decimals)
//! - Rounding to 2 decimals happens exactly once per value, when it is
//!   formatted for display - never inside business logic

use crate::core_types::Cents;
use rust_decimal::prelude::*;
use thiserror::Error;

/// EUR minor-unit decimals
pub const EURO_DECIMALS: u32 = 2;

const CENTS_PER_EURO: i64 = 100;

/// Money conversion errors
#[derive(Debug, Error)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// Parse: Client -> Internal (String -> Cents)
// ============================================================================

/// Convert a client euro amount string to cents.
///
/// Strict format rules (no silent truncation):
/// - positive, non-zero amounts only
/// - at most 2 fractional digits
/// - both sides of the dot must be present ("0.5", not ".5" or "5.")
///
/// # Example
/// ```
/// use altivest::money::parse_euros;
/// assert_eq!(parse_euros("250").unwrap(), 25_000);
/// assert_eq!(parse_euros("99.90").unwrap(), 9_990);
/// ```
pub fn parse_euros(amount_str: &str) -> Result<Cents, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    let parts: Vec<&str> = amount_str.split('.').collect();
    let (whole, frac) = match parts.len() {
        1 => (parts[0], ""),
        2 => {
            // Require both sides of the dot to be non-empty: rejects ".5" and "5."
            if parts[0].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing leading zero (e.g., use 0.5 instead of .5)".into(),
                ));
            }
            if parts[1].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
                ));
            }
            (parts[0], parts[1])
        }
        _ => return Err(MoneyError::InvalidFormat("multiple decimal points".into())),
    };

    if frac.len() > EURO_DECIMALS as usize {
        return Err(MoneyError::PrecisionOverflow {
            provided: frac.len() as u32,
            max: EURO_DECIMALS,
        });
    }

    let whole_num: i64 = whole.parse::<i64>().map_err(|e| {
        let err_str = e.to_string();
        if err_str.contains("too large") || err_str.contains("overflow") {
            MoneyError::Overflow
        } else {
            MoneyError::InvalidFormat(format!("invalid character in whole part: {}", whole))
        }
    })?;

    let frac_num: i64 = if frac.is_empty() {
        0
    } else {
        let frac_padded = format!("{:0<width$}", frac, width = EURO_DECIMALS as usize);
        frac_padded
            .parse::<i64>()
            .map_err(|_| MoneyError::InvalidFormat("invalid fractional part".into()))?
    };

    let cents = whole_num
        .checked_mul(CENTS_PER_EURO)
        .and_then(|v| v.checked_add(frac_num))
        .ok_or(MoneyError::Overflow)?;

    if cents == 0 {
        return Err(MoneyError::InvalidAmount);
    }

    Ok(cents)
}

// ============================================================================
// Format: Internal -> Client (Cents -> String / Decimal)
// ============================================================================

/// Convert cents to a euro display string with fixed 2-decimal precision.
///
/// # Example
/// ```
/// use altivest::money::format_euros;
/// assert_eq!(format_euros(27_000), "270.00");
/// assert_eq!(format_euros(-5_000), "-50.00");
/// ```
pub fn format_euros(cents: Cents) -> String {
    let decimal_value = Decimal::from(cents) / Decimal::from(CENTS_PER_EURO);
    format!("{:.prec$}", decimal_value, prec = EURO_DECIMALS as usize)
}

/// Convert cents to a euro `Decimal` (exact, no rounding needed: scale 2).
pub fn cents_to_euros(cents: Cents) -> Decimal {
    Decimal::from(cents) / Decimal::from(CENTS_PER_EURO)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn qa_parse_euros_variations() {
        assert_eq!(parse_euros("1.23").unwrap(), 123);
        assert_eq!(parse_euros("250").unwrap(), 25_000);
        assert_eq!(parse_euros("001.23").unwrap(), 123);
        assert_eq!(parse_euros("0.01").unwrap(), 1);
        assert_eq!(parse_euros("  42.50 ").unwrap(), 4_250);

        // Zero representations rejected: deposits/withdrawals must be positive
        assert!(parse_euros("0").is_err());
        assert!(parse_euros("0.00").is_err());
    }

    #[test]
    fn qa_parse_euros_invalid_formats() {
        let cases = vec![
            "1,000.00", // Commas not allowed
            "1.2.3",    // Multiple dots
            "1. 23",    // Spaces inside
            "+1.23",    // Explicit plus rejected
            "-5",       // Negative rejected
            "1e2",      // Scientific notation rejected
            ".",        // Just a dot rejected
            ".5",       // Missing leading zero rejected (STRICT)
            "5.",       // Missing fractional part rejected (STRICT)
        ];

        for case in cases {
            assert!(parse_euros(case).is_err(), "Should reject: {}", case);
        }
    }

    #[test]
    fn qa_parse_euros_precision_limit() {
        assert!(parse_euros("1.23").is_ok());

        let res = parse_euros("1.234");
        assert!(matches!(
            res,
            Err(MoneyError::PrecisionOverflow {
                provided: 3,
                max: 2
            })
        ));
    }

    #[test]
    fn qa_format_euros_fixed_two_decimals() {
        assert_eq!(format_euros(27_000), "270.00");
        assert_eq!(format_euros(1), "0.01");
        assert_eq!(format_euros(0), "0.00");
        assert_eq!(format_euros(-5_000), "-50.00");
        assert_eq!(format_euros(199_999), "1999.99");
    }

    #[test]
    fn qa_roundtrip_consistency() {
        for val in ["0.01", "1.50", "250", "1234.56", "999999.99"] {
            let cents = parse_euros(val).unwrap();
            let formatted = format_euros(cents);
            assert_eq!(parse_euros(&formatted).unwrap(), cents, "roundtrip {}", val);
        }
    }

    #[test]
    fn qa_cents_to_euros_is_exact() {
        assert_eq!(cents_to_euros(12_370), Decimal::from_str("123.70").unwrap());
        assert_eq!(cents_to_euros(-1), Decimal::from_str("-0.01").unwrap());
    }
}
