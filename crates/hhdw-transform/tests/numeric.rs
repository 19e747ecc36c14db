//! Tests for locale-aware numeric normalization.

use hhdw_transform::{
    DecimalSeparator, NumericColumn, format_numeric, infer_decimal_separator, normalize_numeric,
    normalize_numeric_column, parse_with_separator,
};
use proptest::prelude::*;

fn render(values: &[Option<&str>], column: &NumericColumn) -> String {
    let mut lines = vec![format!("separator: {:?}", column.separator)];
    for (raw, parsed) in values.iter().zip(&column.values) {
        let parsed = parsed.map(format_numeric).unwrap_or_else(|| "-".to_string());
        lines.push(format!("{} => {parsed}", raw.unwrap_or("<null>")));
    }
    lines.join("\n")
}

#[test]
fn comma_decimal_column() {
    let values = [Some("1.234,56"), Some("12,5"), Some("$ 3.000,00"), None];
    let column = normalize_numeric_column(&values);
    assert_eq!(column.separator, DecimalSeparator::Comma);
    assert_eq!(column.values[0], Some(1234.56));
    assert_eq!(column.values[1], Some(12.5));
    assert_eq!(column.values[2], Some(3000.0));
    assert_eq!(column.values[3], None);
}

#[test]
fn dot_decimal_column() {
    let values = [Some("1,234.56"), Some("10.25"), Some("7")];
    let column = normalize_numeric_column(&values);
    assert_eq!(column.separator, DecimalSeparator::Dot);
    assert_eq!(column.values[0], Some(1234.56));
    assert_eq!(column.values[1], Some(10.25));
    assert_eq!(column.values[2], Some(7.0));
}

#[test]
fn single_values() {
    assert_eq!(normalize_numeric("1.234,56"), Some(1234.56));
    assert_eq!(normalize_numeric("1,234.56"), Some(1234.56));
    assert_eq!(normalize_numeric("45 %"), Some(45.0));
}

#[test]
fn unparseable_values_become_none() {
    assert_eq!(parse_with_separator("abc", DecimalSeparator::Dot), None);
    assert_eq!(parse_with_separator("", DecimalSeparator::Comma), None);
    assert_eq!(parse_with_separator("1-2-3", DecimalSeparator::Dot), None);
}

#[test]
fn inference_only_samples_first_hundred() {
    let mut values: Vec<Option<&str>> = vec![Some("1000"); 100];
    values.extend(std::iter::repeat_n(Some("1,5"), 50));
    assert_eq!(
        infer_decimal_separator(values.iter().copied()),
        DecimalSeparator::Dot
    );
}

proptest! {
    #[test]
    fn comma_formatted_integers_parse_back(n in 0u32..10_000_000) {
        let grouped = n
            .to_string()
            .as_bytes()
            .rchunks(3)
            .rev()
            .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(".");
        let text = format!("{grouped},00");
        prop_assert_eq!(parse_with_separator(&text, DecimalSeparator::Comma), Some(f64::from(n)));
    }
}

#[test]
fn quantity_columns_by_locale() {
    let comma = [
        Some("1.234,56"),
        Some("12,5"),
        Some("$ 3.000,00"),
        Some("7 %"),
        Some("N/A"),
        None,
    ];
    insta::assert_snapshot!(render(&comma, &normalize_numeric_column(&comma)), @r"
    separator: Comma
    1.234,56 => 1234.56
    12,5 => 12.5
    $ 3.000,00 => 3000
    7 % => 7
    N/A => -
    <null> => -
    ");

    let dot = [Some("1,234.5"), Some("980"), Some("15.75")];
    insta::assert_snapshot!(render(&dot, &normalize_numeric_column(&dot)), @r"
    separator: Dot
    1,234.5 => 1234.5
    980 => 980
    15.75 => 15.75
    ");
}
