//! Numeric normalization for locale-noisy portal text.
//!
//! Cell values on the proforma page arrive with currency markers, unit
//! words, thousands separators, and stray whitespace. `normalize` reduces
//! them to a plain `f64` and never fails — unparsable input is 0.0.

/// Tokens the portal mixes into numeric cells.
const NOISE_TOKENS: [&str; 2] = ["USD", "Unidad"];

/// Parse a numeric cell into an `f64`.
///
/// Strips the known noise tokens, then every character outside `[0-9.]`.
/// Commas are not decimal separators on this portal — `"1,234.50"` becomes
/// `1234.50`. Empty or unparsable remainders (e.g. two decimal points)
/// yield 0.0.
pub fn normalize(text: &str) -> f64 {
    let mut cleaned = text.to_string();
    for token in NOISE_TOKENS {
        cleaned = cleaned.replace(token, "");
    }

    let digits: String = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if digits.is_empty() {
        return 0.0;
    }
    digits.parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_number() {
        assert_eq!(normalize("21.0"), 21.0);
        assert_eq!(normalize("2"), 2.0);
    }

    #[test]
    fn test_currency_noise_stripped() {
        assert_eq!(normalize("$ 1,234.50 USD"), 1234.50);
        assert_eq!(normalize("USD 10.5"), 10.5);
    }

    #[test]
    fn test_unit_word_alone_is_zero() {
        assert_eq!(normalize("Unidad"), 0.0);
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(normalize(""), 0.0);
        assert_eq!(normalize("   "), 0.0);
    }

    #[test]
    fn test_comma_is_dropped_not_decimal() {
        // European-style input loses its comma entirely rather than
        // becoming a decimal point.
        assert_eq!(normalize("1,5"), 15.0);
    }

    #[test]
    fn test_unparsable_remainder_is_zero() {
        assert_eq!(normalize("1.234.50"), 0.0);
        assert_eq!(normalize("sin valor"), 0.0);
    }
}
