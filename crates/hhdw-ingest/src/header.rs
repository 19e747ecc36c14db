//! Column-name canonicalization.
//!
//! Canonical names are implicit join keys between sources ingested
//! independently, so the mapping must be deterministic and idempotent:
//! `canonicalize_header(canonicalize_header(h)) == canonicalize_header(h)`.

use std::collections::HashSet;

use hhdw_model::text::strip_diacritics;

/// Name used when a header has no alphanumeric characters at all.
pub const EMPTY_HEADER: &str = "col";

/// Characters without an NFKD decomposition to ASCII.
fn transliterate_extra(ch: char) -> Option<&'static str> {
    Some(match ch {
        'ß' => "ss",
        'æ' | 'Æ' => "ae",
        'œ' | 'Œ' => "oe",
        'ø' | 'Ø' => "o",
        'ł' | 'Ł' => "l",
        'đ' | 'Đ' => "d",
        'þ' | 'Þ' => "th",
        _ => return None,
    })
}

fn to_ascii(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in strip_diacritics(value).chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else if let Some(replacement) = transliterate_extra(ch) {
            out.push_str(replacement);
        } else {
            out.push(' ');
        }
    }
    out
}

/// Canonicalizes a single header: ASCII, lowercase, `_`-separated.
pub fn canonicalize_header(raw: &str) -> String {
    let ascii = to_ascii(raw);
    let mut out = String::with_capacity(ascii.len());
    let mut pending_separator = false;
    for ch in ascii.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }
    if out.is_empty() {
        EMPTY_HEADER.to_string()
    } else {
        out
    }
}

/// Canonicalizes a header set, suffixing collisions with `_2`, `_3`, ...
pub fn canonicalize_headers<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(raw.len());
    let mut out = Vec::with_capacity(raw.len());
    for header in raw {
        let base = canonicalize_header(header.as_ref());
        let mut name = base.clone();
        let mut suffix = 1;
        while used.contains(&name) {
            suffix += 1;
            name = format!("{base}_{suffix}");
        }
        used.insert(name.clone());
        out.push(name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_headers() {
        assert_eq!(canonicalize_header("Fecha de Ingreso"), "fecha_de_ingreso");
        assert_eq!(canonicalize_header("  N° Pedido  "), "n_pedido");
        assert_eq!(canonicalize_header("Identificación Paciente"), "identificacion_paciente");
        assert_eq!(canonicalize_header("__Vía--Administración__"), "via_administracion");
    }

    #[test]
    fn test_empty_header() {
        assert_eq!(canonicalize_header(""), "col");
        assert_eq!(canonicalize_header("###"), "col");
    }

    #[test]
    fn test_extra_transliteration() {
        assert_eq!(canonicalize_header("Straße"), "strasse");
    }
}
