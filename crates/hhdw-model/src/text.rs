//! Text folding helpers.
//!
//! Natural keys and catalog names are compared after folding, so both sides of
//! every join must go through the same functions in this module.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Removes diacritics via NFKD decomposition (`"Peñalosa"` -> `"Penalosa"`).
pub fn strip_diacritics(value: &str) -> String {
    value.nfkd().filter(|ch| !is_combining_mark(*ch)).collect()
}

/// Removes byte-order marks and zero-width characters, and turns
/// non-breaking spaces into regular spaces.
pub fn strip_invisible(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !matches!(ch, '\u{feff}' | '\u{200b}' | '\u{200c}' | '\u{200d}'))
        .map(|ch| if ch == '\u{a0}' { ' ' } else { ch })
        .collect()
}

/// Collapses every whitespace run to a single space and trims the ends.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim, accent-fold, uppercase and collapse whitespace.
pub fn fold_key(value: &str) -> String {
    let cleaned = strip_invisible(value);
    collapse_whitespace(&strip_diacritics(cleaned.trim()).to_uppercase())
}

/// Values that spreadsheet exports use to mean "no value".
pub fn is_null_token(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_uppercase().as_str(),
        "" | "NAN" | "NONE" | "NULL" | "N/A" | "NAT"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_accents() {
        assert_eq!(strip_diacritics("Peñalosa Ávila"), "Penalosa Avila");
    }

    #[test]
    fn fold_key_is_case_and_space_insensitive() {
        assert_eq!(fold_key("  nueva   eps\u{a0}s.a. "), "NUEVA EPS S.A.");
        assert_eq!(fold_key("\u{feff}Sánitas"), "SANITAS");
    }

    #[test]
    fn null_tokens() {
        assert!(is_null_token("nan"));
        assert!(is_null_token("  "));
        assert!(!is_null_token("0"));
    }
}
