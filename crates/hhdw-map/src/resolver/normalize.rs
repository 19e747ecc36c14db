//! Text normalization applied to both source values and catalog names.
//!
//! Resolution is only sound if both sides pass through the same
//! [`TextNormalizer`]; the resolver enforces this by owning the normalizer
//! and normalizing catalog names itself.

use std::collections::HashSet;

use hhdw_model::text::strip_diacritics;

/// Stopwords removed unless configuration replaces the list.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "DE", "DEL", "LA", "LAS", "EL", "LOS", "Y", "CON", "PARA", "POR", "EN", "X", "A",
];

/// Unit-of-measure spellings folded to one canonical token.
const UNIT_ALIASES: &[(&str, &str)] = &[
    ("MG", "MG"),
    ("MGS", "MG"),
    ("MILIGRAMO", "MG"),
    ("MILIGRAMOS", "MG"),
    ("MCG", "MCG"),
    ("MCGS", "MCG"),
    ("UG", "MCG"),
    ("MICROGRAMO", "MCG"),
    ("MICROGRAMOS", "MCG"),
    ("ML", "ML"),
    ("MLS", "ML"),
    ("CC", "ML"),
    ("MILILITRO", "ML"),
    ("MILILITROS", "ML"),
    ("G", "G"),
    ("GR", "G"),
    ("GRS", "G"),
    ("GRAMO", "G"),
    ("GRAMOS", "G"),
    ("L", "L"),
    ("LT", "L"),
    ("LTS", "L"),
    ("LITRO", "L"),
    ("LITROS", "L"),
    ("UI", "UI"),
    ("IU", "UI"),
];

fn canonical_unit(token: &str) -> Option<&'static str> {
    UNIT_ALIASES
        .iter()
        .find(|(alias, _)| *alias == token)
        .map(|(_, unit)| *unit)
}

/// Splits `500MGS` into `("500", "MG")` when the suffix is a known unit.
fn split_quantity(token: &str) -> Option<(&str, &'static str)> {
    let split = token.find(|c: char| !c.is_ascii_digit())?;
    if split == 0 {
        return None;
    }
    let (digits, suffix) = token.split_at(split);
    canonical_unit(suffix).map(|unit| (digits, unit))
}

#[derive(Debug, Clone)]
pub struct TextNormalizer {
    stopwords: HashSet<String>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_STOPWORDS.iter().copied())
    }
}

impl TextNormalizer {
    pub fn new<I, S>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stopwords: stopwords
                .into_iter()
                .map(|w| strip_diacritics(w.as_ref()).trim().to_uppercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// Uppercase, strip accents, fold unit spellings, remove symbols and
    /// stopwords, collapse whitespace.
    pub fn normalize(&self, text: &str) -> String {
        let micro_folded = text.replace(['µ', 'μ'], "MC");
        let upper = strip_diacritics(&micro_folded).to_uppercase();
        let restricted: String = upper
            .chars()
            .map(|c| {
                if c.is_ascii_uppercase() || c.is_ascii_digit() {
                    c
                } else {
                    ' '
                }
            })
            .collect();

        let mut tokens: Vec<String> = Vec::new();
        for token in restricted
            .split_whitespace()
            .filter(|t| !self.stopwords.contains(*t))
        {
            if let Some(unit) = canonical_unit(token) {
                match tokens.last_mut() {
                    Some(prev) if prev.chars().all(|c| c.is_ascii_digit()) => prev.push_str(unit),
                    _ => tokens.push(unit.to_string()),
                }
            } else if let Some((digits, unit)) = split_quantity(token) {
                tokens.push(format!("{digits}{unit}"));
            } else {
                tokens.push(token.to_string());
            }
        }
        tokens.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_accents_and_symbols() {
        let n = TextNormalizer::default();
        assert_eq!(n.normalize("Acetaminofén 500 mg - Tableta"), "ACETAMINOFEN 500MG TABLETA");
        assert_eq!(n.normalize("  gasa   estéril\t"), "GASA ESTERIL");
    }

    #[test]
    fn unit_variants_fold_to_one_spelling() {
        let n = TextNormalizer::default();
        assert_eq!(n.normalize("Solución salina 500 CC"), "SOLUCION SALINA 500ML");
        assert_eq!(n.normalize("vitamina b12 100µg"), "VITAMINA B12 100MCG");
        assert_eq!(n.normalize("IBUPROFENO 400MGS"), "IBUPROFENO 400MG");
        assert_eq!(n.normalize("insulina 100 IU"), "INSULINA 100UI");
    }

    #[test]
    fn stopwords_are_dropped() {
        let n = TextNormalizer::default();
        assert_eq!(
            n.normalize("Jeringa de 5 ml con aguja"),
            "JERINGA 5ML AGUJA"
        );
        let custom = TextNormalizer::new(["caja"]);
        assert_eq!(custom.normalize("Caja de guantes"), "DE GUANTES");
    }
}
