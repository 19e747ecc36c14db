//! Tests for date normalization.

use chrono::NaiveDate;
use hhdw_transform::{
    DateColumn, DateOrder, canonical_date_text, format_date, is_date_column, normalize_date,
    normalize_date_column, parse_date_with,
};

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn spanish_abbreviated_month_day_first() {
    assert_eq!(normalize_date("15-Ene-2024"), Some(ymd(2024, 1, 15)));
    assert_eq!(normalize_date("02-ago-2023"), Some(ymd(2023, 8, 2)));
    assert_eq!(normalize_date("9 Dic 2022"), Some(ymd(2022, 12, 9)));
}

#[test]
fn spanish_full_month_names() {
    assert_eq!(
        normalize_date("15 de enero de 2024"),
        Some(ymd(2024, 1, 15))
    );
    assert_eq!(normalize_date("1-Septiembre-2021"), Some(ymd(2021, 9, 1)));
    assert_eq!(normalize_date("30 Abril 2020"), Some(ymd(2020, 4, 30)));
}

#[test]
fn numeric_dates_follow_order_preference() {
    assert_eq!(
        parse_date_with("03/04/2024", DateOrder::DayFirst),
        Some(ymd(2024, 4, 3))
    );
    assert_eq!(
        parse_date_with("03/04/2024", DateOrder::MonthFirst),
        Some(ymd(2024, 3, 4))
    );
    assert_eq!(parse_date_with("01/15/2024", DateOrder::DayFirst), None);
}

#[test]
fn iso_dates_ignore_order() {
    assert_eq!(
        parse_date_with("2024-01-15", DateOrder::MonthFirst),
        Some(ymd(2024, 1, 15))
    );
    assert_eq!(normalize_date("2024/01/15"), Some(ymd(2024, 1, 15)));
}

#[test]
fn blanks_and_garbage_are_none() {
    assert_eq!(normalize_date(""), None);
    assert_eq!(normalize_date("nan"), None);
    assert_eq!(normalize_date("sin fecha"), None);
    assert_eq!(normalize_date("32/01/2024"), None);
}

#[test]
fn column_retries_month_first_when_day_first_mostly_fails() {
    let values = [
        Some("01/15/2024"),
        Some("02/20/2024"),
        Some("03/25/2024"),
        Some("12/31/2023"),
        None,
    ];
    let column = normalize_date_column(&values);
    assert_eq!(column.order, DateOrder::MonthFirst);
    assert_eq!(column.parsed_count(), 4);
    assert_eq!(column.values[0], Some(ymd(2024, 1, 15)));
    assert_eq!(column.values[4], None);
}

#[test]
fn column_keeps_day_first_when_it_parses_enough() {
    let values = [Some("03/04/2024"), Some("15/04/2024"), Some("x")];
    let column = normalize_date_column(&values);
    assert_eq!(column.order, DateOrder::DayFirst);
    assert_eq!(column.values[0], Some(ymd(2024, 4, 3)));
    assert_eq!(column.values[2], None);
}

#[test]
fn canonical_text_hides_cosmetic_differences() {
    assert_eq!(canonical_date_text("15/01/2024"), "2024-01-15");
    assert_eq!(canonical_date_text("2024-01-15 00:00:00"), "2024-01-15");
    assert_eq!(canonical_date_text(" pendiente "), "pendiente");
}

#[test]
fn date_column_names() {
    assert!(is_date_column("fecha_ingreso"));
    assert!(is_date_column("fch_entrega"));
    assert!(!is_date_column("equipo"));
}

fn render(values: &[Option<&str>], column: &DateColumn) -> String {
    let mut lines = vec![format!("order: {:?}", column.order)];
    for (raw, parsed) in values.iter().zip(&column.values) {
        let parsed = parsed.map(format_date).unwrap_or_else(|| "-".to_string());
        lines.push(format!("{} => {parsed}", raw.unwrap_or("<null>")));
    }
    lines.join("\n")
}

#[test]
fn mixed_export_column_normalizes_day_first() {
    let values = [
        Some("15/01/2024"),
        Some("2024-02-03"),
        Some("15 de enero de 2024"),
        Some("09-Mar-2024"),
        Some("45292"),
        Some("pendiente"),
        None,
    ];
    let column = normalize_date_column(&values);
    insta::assert_snapshot!(render(&values, &column), @r"
    order: DayFirst
    15/01/2024 => 2024-01-15
    2024-02-03 => 2024-02-03
    15 de enero de 2024 => 2024-01-15
    09-Mar-2024 => 2024-03-09
    45292 => 2024-01-01
    pendiente => -
    <null> => -
    ");
}
