//! Value normalization shared by the dimension builders and the fact assembler.

pub mod datetime;
pub mod numeric;

pub use datetime::{
    DateColumn, DateOrder, canonical_date_text, format_date, is_date_column, normalize_date,
    normalize_date_column, parse_date_with, translate_month_tokens,
};
pub use numeric::{
    DecimalSeparator, NumericColumn, format_numeric, infer_decimal_separator,
    normalize_numeric, normalize_numeric_column, parse_f64, parse_with_separator,
};
