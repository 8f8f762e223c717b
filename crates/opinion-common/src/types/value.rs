//! Tagged cell values and column type inference

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Raw field contents treated as missing values when reading source files.
pub const NULL_TOKENS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "NULL", "null", "None", "<NA>", "#N/A",
];

/// Date layout accepted for date-typed columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Largest float magnitude that still has an exact integer representation.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Loose column type, inferred once from the source data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Date,
}

impl ColumnType {
    /// Infer the narrowest type every non-null raw field fits into.
    ///
    /// Integer beats Float beats Date beats Text. A column without any
    /// non-null field is Text.
    pub fn infer<'a, I>(fields: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut integer = true;
        let mut float = true;
        let mut date = true;
        let mut seen = false;

        for raw in fields {
            if is_null_token(raw) {
                continue;
            }
            seen = true;
            let trimmed = raw.trim();
            if integer && trimmed.parse::<i64>().is_err() {
                integer = false;
            }
            if float && parse_finite_float(trimmed).is_none() {
                float = false;
            }
            if date && NaiveDate::parse_from_str(trimmed, DATE_FORMAT).is_err() {
                date = false;
            }
            if !integer && !float && !date {
                return ColumnType::Text;
            }
        }

        match (seen, integer, float, date) {
            (false, ..) => ColumnType::Text,
            (true, true, _, _) => ColumnType::Integer,
            (true, false, true, _) => ColumnType::Float,
            (true, false, false, true) => ColumnType::Date,
            _ => ColumnType::Text,
        }
    }

    /// Coerce a raw field into a value of this type.
    ///
    /// Fields that do not fit the type become [`Value::Null`]; inference
    /// guarantees this never happens for the column the type was inferred from.
    pub fn coerce(self, raw: &str) -> Value {
        if is_null_token(raw) {
            return Value::Null;
        }
        let trimmed = raw.trim();
        match self {
            ColumnType::Integer => trimmed.parse().map(Value::Integer).unwrap_or(Value::Null),
            ColumnType::Float => parse_finite_float(trimmed)
                .map(Value::Float)
                .unwrap_or(Value::Null),
            ColumnType::Date => NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .map(Value::Date)
                .unwrap_or(Value::Null),
            ColumnType::Text => Value::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Text => write!(f, "text"),
            ColumnType::Date => write!(f, "date"),
        }
    }
}

/// Whether a raw field denotes a missing value
pub fn is_null_token(raw: &str) -> bool {
    NULL_TOKENS.contains(&raw)
}

fn parse_finite_float(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// A single cell
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Type of the cell, `None` for nulls
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(ColumnType::Integer),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Date(_) => Some(ColumnType::Date),
        }
    }

    /// Canonical text used for semi-join membership tests.
    ///
    /// Integral floats render like integers so that `1.0` read from one source
    /// matches `1` read from another. Nulls never match anything.
    pub fn join_key(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT => {
                Some((*f as i64).to_string())
            },
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Date(d) => Some(d.format(DATE_FORMAT).to_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {},
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Date(d) => d.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_integer_with_nulls() {
        assert_eq!(ColumnType::infer(["1", "", "42", "NaN"]), ColumnType::Integer);
    }

    #[test]
    fn test_infer_float_beats_integer() {
        assert_eq!(ColumnType::infer(["1", "2.5"]), ColumnType::Float);
    }

    #[test]
    fn test_infer_date_and_text() {
        assert_eq!(ColumnType::infer(["2024-01-31", "2023-12-01"]), ColumnType::Date);
        assert_eq!(ColumnType::infer(["2024-01-31", "yesterday"]), ColumnType::Text);
        assert_eq!(ColumnType::infer(["", "NULL"]), ColumnType::Text);
    }

    #[test]
    fn test_infer_rejects_non_finite_floats() {
        assert_eq!(ColumnType::infer(["inf", "1.0"]), ColumnType::Text);
    }

    #[test]
    fn test_coerce_keeps_text_verbatim() {
        assert_eq!(ColumnType::Text.coerce("  john "), Value::Text("  john ".into()));
        assert_eq!(ColumnType::Integer.coerce(" 7 "), Value::Integer(7));
        assert_eq!(ColumnType::Integer.coerce("n/a"), Value::Null);
    }

    #[test]
    fn test_join_key_normalizes_integral_floats() {
        assert_eq!(Value::Float(10.0).join_key().as_deref(), Some("10"));
        assert_eq!(Value::Float(1.5).join_key().as_deref(), Some("1.5"));
        assert_eq!(Value::Integer(10).join_key().as_deref(), Some("10"));
        assert_eq!(Value::Null.join_key(), None);
    }

    #[test]
    fn test_float_equality_is_bitwise() {
        assert_eq!(Value::Float(0.1), Value::Float(0.1));
        assert_ne!(Value::Float(1.0), Value::Integer(1));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn integer_columns_coerce_without_loss(values in prop::collection::vec(any::<i64>(), 1..20)) {
                let raw: Vec<String> = values.iter().map(i64::to_string).collect();
                let ty = ColumnType::infer(raw.iter().map(String::as_str));
                prop_assert_eq!(ty, ColumnType::Integer);
                for (field, value) in raw.iter().zip(&values) {
                    prop_assert_eq!(ty.coerce(field), Value::Integer(*value));
                }
            }

            #[test]
            fn integral_floats_share_integer_join_keys(i in -(1i64 << 52)..(1i64 << 52)) {
                prop_assert_eq!(Value::Float(i as f64).join_key(), Value::Integer(i).join_key());
            }

            #[test]
            fn inferred_type_never_nulls_a_present_field(fields in prop::collection::vec("[a-z0-9.\\-]{1,6}", 1..10)) {
                let ty = ColumnType::infer(fields.iter().map(String::as_str));
                for field in &fields {
                    prop_assert_eq!(ty.coerce(field).is_null(), is_null_token(field));
                }
            }
        }
    }
}
